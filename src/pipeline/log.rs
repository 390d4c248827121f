//! Request log entries and the durable sink they flow into.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One entry per terminal request path.
///
/// This is the single point of truth the metrics aggregator consumes; the
/// pipeline emits exactly one of these per request.
#[derive(Debug, Clone, Serialize)]
pub struct RequestLog {
    /// Unique id for this request
    pub id: Uuid,
    /// Request path
    pub endpoint: String,
    /// HTTP verb
    pub method: String,
    /// Final status code
    pub status_code: u16,
    /// Elapsed handler time in milliseconds; 0 for pre-handler rejections
    pub response_time_ms: u64,
    /// Whether the response came from cache
    pub cache_hit: bool,
    /// When the request finished
    pub timestamp: DateTime<Utc>,
    /// Client identity the limiter saw
    pub client_id: String,
    /// Caller's user agent, if sent
    pub user_agent: Option<String>,
}

/// Durable recorder of request log entries.
///
/// Sink failures are best-effort log loss: the pipeline reports them to the
/// operational log and continues.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Durably record one entry.
    async fn record(&self, entry: RequestLog) -> anyhow::Result<()>;
}
