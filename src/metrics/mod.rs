//! Rolling request metrics and snapshot emission.

pub mod aggregator;

pub use aggregator::{MetricsAggregator, MetricsSample, MetricsSnapshot, SnapshotSink};
