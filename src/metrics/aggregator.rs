//! Rolling metrics aggregator.
//!
//! One sample per request flows in from the pipeline; snapshots flow out to
//! the history collaborator on flush. Between flushes the transient counters
//! satisfy `cache_hits + cache_misses == total_requests`.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::clock::Clock;

/// Rolling buffer capacity; oldest samples are evicted first.
const SAMPLE_BUFFER_CAP: usize = 1000;

/// A flush is triggered automatically every this many recorded samples.
const FLUSH_EVERY: u64 = 100;

/// Fixed normalization window for the requests-per-second figure.
const RPS_WINDOW_SECS: f64 = 60.0;

/// Ephemeral per-request record.
#[derive(Debug, Clone)]
pub struct MetricsSample {
    /// Handler latency in milliseconds (0 for pre-handler rejections)
    pub response_time_ms: u64,
    /// Whether the response was served from cache
    pub cache_hit: bool,
    /// Final HTTP status code
    pub status_code: u16,
    /// When the request finished
    pub timestamp: DateTime<Utc>,
}

/// Immutable aggregate emitted on flush and served by `latest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Mean response time over the rolling buffer, rounded
    pub avg_response_time_ms: u64,
    /// Cache hits as a percentage of hits plus misses
    pub cache_hit_rate_pct: f64,
    /// Requests over a fixed 60-second normalization window
    pub requests_per_second: f64,
    /// Error responses (status >= 400) as a percentage of all requests
    pub error_rate_pct: f64,
    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,
}

/// Receiver of flushed snapshots.
///
/// The append-only snapshot history belongs to this collaborator, not to
/// the aggregator.
pub trait SnapshotSink: Send + Sync {
    /// Append a snapshot to the history.
    fn append(&self, snapshot: MetricsSnapshot) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
struct AggregatorState {
    samples: VecDeque<MetricsSample>,
    total_requests: u64,
    cache_hits: u64,
    cache_misses: u64,
    error_count: u64,
}

impl AggregatorState {
    fn snapshot(&self, now: DateTime<Utc>) -> MetricsSnapshot {
        let avg_response_time_ms = if self.samples.is_empty() {
            0
        } else {
            let sum: u64 = self.samples.iter().map(|s| s.response_time_ms).sum();
            ((sum as f64) / (self.samples.len() as f64)).round() as u64
        };

        let classified = self.cache_hits + self.cache_misses;
        let cache_hit_rate_pct = if classified > 0 {
            (self.cache_hits as f64 / classified as f64) * 100.0
        } else {
            0.0
        };

        let requests_per_second = self.total_requests as f64 / RPS_WINDOW_SECS;

        let error_rate_pct = if self.total_requests > 0 {
            (self.error_count as f64 / self.total_requests as f64) * 100.0
        } else {
            0.0
        };

        MetricsSnapshot {
            avg_response_time_ms,
            cache_hit_rate_pct,
            requests_per_second,
            error_rate_pct,
            timestamp: now,
        }
    }

    fn reset_counters(&mut self) {
        self.cache_hits = 0;
        self.cache_misses = 0;
        self.total_requests = 0;
        self.error_count = 0;
    }
}

/// Rolling counters with periodic snapshot emission.
///
/// Thread-safe; the sample buffer and counters move together under one
/// short-lived lock so readers never observe a half-applied sample.
pub struct MetricsAggregator {
    state: Mutex<AggregatorState>,
    sink: Arc<dyn SnapshotSink>,
    clock: Arc<dyn Clock>,
}

impl MetricsAggregator {
    /// Create an aggregator that emits snapshots to the given sink.
    pub fn new(sink: Arc<dyn SnapshotSink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(AggregatorState::default()),
            sink,
            clock,
        }
    }

    /// Record one request sample.
    ///
    /// Triggers a flush automatically every [`FLUSH_EVERY`] samples; the
    /// background task flushes on a timer independently.
    pub fn record(&self, sample: MetricsSample) {
        let flushed = {
            let mut state = self.state.lock();

            state.total_requests += 1;
            if sample.cache_hit {
                state.cache_hits += 1;
            } else {
                state.cache_misses += 1;
            }
            if sample.status_code >= 400 {
                state.error_count += 1;
            }

            state.samples.push_back(sample);
            while state.samples.len() > SAMPLE_BUFFER_CAP {
                state.samples.pop_front();
            }

            if state.total_requests % FLUSH_EVERY == 0 {
                let snapshot = state.snapshot(self.clock.now());
                state.reset_counters();
                Some(snapshot)
            } else {
                None
            }
        };

        if let Some(snapshot) = flushed {
            self.emit(snapshot);
        }
    }

    /// Compute a snapshot, emit it to the history sink, and reset the
    /// transient counters. The rolling buffer is kept (trimmed, not
    /// cleared).
    ///
    /// Returns `None` without emitting when nothing has been recorded yet.
    pub fn flush(&self) -> Option<MetricsSnapshot> {
        let snapshot = {
            let mut state = self.state.lock();
            if state.samples.is_empty() {
                return None;
            }
            let snapshot = state.snapshot(self.clock.now());
            state.reset_counters();
            snapshot
        };

        self.emit(snapshot.clone());
        Some(snapshot)
    }

    /// Live snapshot over current state, for status queries.
    ///
    /// Same formulas as `flush`, but nothing is emitted or reset.
    pub fn latest(&self) -> MetricsSnapshot {
        self.state.lock().snapshot(self.clock.now())
    }

    /// Transient counter readout: (total, hits, misses, errors).
    pub fn counters(&self) -> (u64, u64, u64, u64) {
        let state = self.state.lock();
        (
            state.total_requests,
            state.cache_hits,
            state.cache_misses,
            state.error_count,
        )
    }

    fn emit(&self, snapshot: MetricsSnapshot) {
        debug!(
            avg_response_time_ms = snapshot.avg_response_time_ms,
            cache_hit_rate_pct = snapshot.cache_hit_rate_pct,
            requests_per_second = snapshot.requests_per_second,
            error_rate_pct = snapshot.error_rate_pct,
            "Flushed metrics snapshot"
        );
        if let Err(e) = self.sink.append(snapshot) {
            warn!(error = %e, "Snapshot sink append failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[derive(Default)]
    struct RecordingSink {
        snapshots: Mutex<Vec<MetricsSnapshot>>,
    }

    impl SnapshotSink for RecordingSink {
        fn append(&self, snapshot: MetricsSnapshot) -> anyhow::Result<()> {
            self.snapshots.lock().push(snapshot);
            Ok(())
        }
    }

    fn aggregator() -> (Arc<RecordingSink>, MetricsAggregator) {
        let sink = Arc::new(RecordingSink::default());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let aggregator = MetricsAggregator::new(sink.clone(), clock);
        (sink, aggregator)
    }

    fn sample(response_time_ms: u64, cache_hit: bool, status_code: u16) -> MetricsSample {
        MetricsSample {
            response_time_ms,
            cache_hit,
            status_code,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_counter_conservation() {
        let (_, aggregator) = aggregator();

        aggregator.record(sample(10, true, 200));
        aggregator.record(sample(20, false, 200));
        aggregator.record(sample(0, false, 429));

        let (total, hits, misses, errors) = aggregator.counters();
        assert_eq!(hits + misses, total);
        assert!(errors <= total);
        assert_eq!(total, 3);
        assert_eq!(errors, 1);
    }

    #[test]
    fn test_latest_formulas() {
        let (_, aggregator) = aggregator();

        aggregator.record(sample(10, true, 200));
        aggregator.record(sample(30, false, 500));

        let snapshot = aggregator.latest();
        assert_eq!(snapshot.avg_response_time_ms, 20);
        assert_eq!(snapshot.cache_hit_rate_pct, 50.0);
        assert_eq!(snapshot.error_rate_pct, 50.0);
        assert_eq!(snapshot.requests_per_second, 2.0 / 60.0);
    }

    #[test]
    fn test_latest_does_not_mutate() {
        let (sink, aggregator) = aggregator();

        aggregator.record(sample(10, true, 200));
        let first = aggregator.latest();
        let second = aggregator.latest();

        assert_eq!(first.avg_response_time_ms, second.avg_response_time_ms);
        assert_eq!(aggregator.counters().0, 1);
        assert!(sink.snapshots.lock().is_empty());
    }

    #[test]
    fn test_empty_state_yields_zeroes() {
        let (_, aggregator) = aggregator();

        let snapshot = aggregator.latest();
        assert_eq!(snapshot.avg_response_time_ms, 0);
        assert_eq!(snapshot.cache_hit_rate_pct, 0.0);
        assert_eq!(snapshot.error_rate_pct, 0.0);
        assert_eq!(snapshot.requests_per_second, 0.0);
    }

    #[test]
    fn test_flush_emits_and_resets_counters() {
        let (sink, aggregator) = aggregator();

        aggregator.record(sample(10, true, 200));
        aggregator.record(sample(20, false, 200));

        let snapshot = aggregator.flush().unwrap();
        assert_eq!(snapshot.cache_hit_rate_pct, 50.0);
        assert_eq!(sink.snapshots.lock().len(), 1);

        // Counters reset, buffer preserved
        let (total, hits, misses, _) = aggregator.counters();
        assert_eq!((total, hits, misses), (0, 0, 0));
        assert_eq!(aggregator.latest().avg_response_time_ms, 15);
    }

    #[test]
    fn test_flush_with_no_samples_is_skipped() {
        let (sink, aggregator) = aggregator();

        assert!(aggregator.flush().is_none());
        assert!(sink.snapshots.lock().is_empty());
    }

    #[test]
    fn test_auto_flush_every_100_samples() {
        let (sink, aggregator) = aggregator();

        for _ in 0..99 {
            aggregator.record(sample(10, false, 200));
        }
        assert!(sink.snapshots.lock().is_empty());

        aggregator.record(sample(10, false, 200));
        assert_eq!(sink.snapshots.lock().len(), 1);
        assert_eq!(aggregator.counters().0, 0);
    }

    #[test]
    fn test_rolling_buffer_evicts_oldest() {
        let (_, aggregator) = aggregator();

        // One slow outlier, then enough fast samples to evict it
        aggregator.record(sample(100_000, false, 200));
        for _ in 0..SAMPLE_BUFFER_CAP {
            aggregator.record(sample(10, false, 200));
        }

        assert_eq!(aggregator.latest().avg_response_time_ms, 10);
    }

    struct FailingSink;

    impl SnapshotSink for FailingSink {
        fn append(&self, _snapshot: MetricsSnapshot) -> anyhow::Result<()> {
            anyhow::bail!("history unavailable")
        }
    }

    #[test]
    fn test_sink_failure_does_not_panic() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let aggregator = MetricsAggregator::new(Arc::new(FailingSink), clock);

        aggregator.record(sample(10, false, 200));
        assert!(aggregator.flush().is_some());
    }
}
