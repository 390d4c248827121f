//! In-memory records store.
//!
//! Plays the durable-collaborator roles the pipeline components depend on:
//! the request log, the append-only metrics snapshot history, and the
//! best-effort cache journal. A real deployment would put a database here;
//! this demo keeps everything in process memory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::collections::VecDeque;

use crate::cache::CacheJournal;
use crate::metrics::{MetricsSnapshot, SnapshotSink};
use crate::pipeline::{LogSink, RequestLog};

/// Bound on retained request log entries.
const MAX_LOG_ENTRIES: usize = 10_000;

/// Journaled view of a cache entry.
#[derive(Debug, Clone)]
pub struct JournalEntry {
    /// When the journaled entry expires
    pub expires_at: DateTime<Utc>,
    /// Hits recorded against it
    pub hits: u64,
}

/// Process-local store for request logs, snapshot history, and the cache
/// journal.
#[derive(Default)]
pub struct RecordsStore {
    api_logs: Mutex<VecDeque<RequestLog>>,
    snapshots: Mutex<Vec<MetricsSnapshot>>,
    journal: Mutex<HashMap<String, JournalEntry>>,
}

impl RecordsStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent request log entries, oldest first.
    pub fn recent_logs(&self, limit: usize) -> Vec<RequestLog> {
        let logs = self.api_logs.lock();
        logs.iter()
            .skip(logs.len().saturating_sub(limit))
            .cloned()
            .collect()
    }

    /// The most recent snapshots, oldest first.
    pub fn latest_snapshots(&self, limit: usize) -> Vec<MetricsSnapshot> {
        let snapshots = self.snapshots.lock();
        snapshots
            .iter()
            .skip(snapshots.len().saturating_sub(limit))
            .cloned()
            .collect()
    }

    /// Total snapshots appended since startup.
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.lock().len()
    }

    /// Journaled state for a cache key.
    pub fn journal_entry(&self, key: &str) -> Option<JournalEntry> {
        self.journal.lock().get(key).cloned()
    }
}

#[async_trait]
impl LogSink for RecordsStore {
    async fn record(&self, entry: RequestLog) -> anyhow::Result<()> {
        let mut logs = self.api_logs.lock();
        logs.push_back(entry);
        while logs.len() > MAX_LOG_ENTRIES {
            logs.pop_front();
        }
        Ok(())
    }
}

impl SnapshotSink for RecordsStore {
    fn append(&self, snapshot: MetricsSnapshot) -> anyhow::Result<()> {
        self.snapshots.lock().push(snapshot);
        Ok(())
    }
}

impl CacheJournal for RecordsStore {
    fn record_entry(&self, key: &str, expires_at: DateTime<Utc>) -> anyhow::Result<()> {
        self.journal.lock().insert(
            key.to_string(),
            JournalEntry {
                expires_at,
                hits: 0,
            },
        );
        Ok(())
    }

    fn record_hit(&self, key: &str) -> anyhow::Result<()> {
        if let Some(entry) = self.journal.lock().get_mut(key) {
            entry.hits += 1;
        }
        Ok(())
    }
}
