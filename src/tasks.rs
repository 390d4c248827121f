//! Background maintenance tasks.
//!
//! The cache sweep, the limiter sweeps, and the metrics flush tick all run
//! as tasks owned by [`BackgroundTasks`], which can cancel them
//! deterministically on shutdown instead of leaving free-running timers
//! behind.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheStore;
use crate::metrics::MetricsAggregator;
use crate::ratelimit::LimiterSet;

/// Intervals for the periodic maintenance work.
#[derive(Debug, Clone, Copy)]
pub struct TaskIntervals {
    /// How often expired cache entries are swept
    pub cache_sweep: Duration,
    /// How often stale limiter entries are swept
    pub limiter_sweep: Duration,
    /// How often metrics are flushed to the snapshot history
    pub metrics_flush: Duration,
}

impl Default for TaskIntervals {
    fn default() -> Self {
        Self {
            cache_sweep: Duration::from_secs(60),
            limiter_sweep: Duration::from_secs(60),
            metrics_flush: Duration::from_secs(60),
        }
    }
}

/// Owner of the spawned maintenance tasks.
pub struct BackgroundTasks {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    /// Spawn the sweeps and the flush tick.
    pub fn start(
        cache: Arc<CacheStore>,
        limiters: Arc<LimiterSet>,
        metrics: Arc<MetricsAggregator>,
        intervals: TaskIntervals,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let mut handles = Vec::new();

        handles.push(spawn_periodic(
            "cache_sweep",
            intervals.cache_sweep,
            shutdown.subscribe(),
            move || {
                cache.sweep();
            },
        ));

        for (class, limiter) in limiters.iter() {
            let limiter = limiter.clone();
            handles.push(spawn_periodic(
                class.name(),
                intervals.limiter_sweep,
                shutdown.subscribe(),
                move || {
                    limiter.sweep();
                },
            ));
        }

        handles.push(spawn_periodic(
            "metrics_flush",
            intervals.metrics_flush,
            shutdown.subscribe(),
            move || {
                metrics.flush();
            },
        ));

        info!(tasks = handles.len(), "Background tasks started");
        Self { shutdown, handles }
    }

    /// Signal all tasks to stop and wait for them to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("Background tasks stopped");
    }
}

fn spawn_periodic(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut work: impl FnMut() + Send + 'static,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick fires immediately; skip it so work runs after one
        // full period
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => work(),
                _ = shutdown.changed() => {
                    debug!(task = name, "Background task stopping");
                    break;
                }
            }
        }
    })
}
