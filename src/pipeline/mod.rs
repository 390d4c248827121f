//! The request pipeline: gate, cache, handle, measure.
//!
//! Every inbound call runs the same state machine: the rate limiter admits
//! the client, the cache store answers if it can, otherwise the downstream
//! handler runs and its result is stored when eligible. Every terminal path
//! produces exactly one log entry, which also feeds the metrics aggregator.

pub mod envelope;
pub mod log;

pub use envelope::Source;
pub use log::{LogSink, RequestLog};

use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;
use uuid::Uuid;

use crate::cache::{CacheClass, CacheStore};
use crate::clock::Clock;
use crate::error::ApiError;
use crate::metrics::{MetricsAggregator, MetricsSample};
use crate::ratelimit::{Decision, LimiterClass, LimiterSet};

/// Per-route pipeline configuration: how to cache and how to gate.
#[derive(Debug, Clone, Copy)]
pub struct RoutePolicy {
    /// TTL class for cacheable responses; `None` disables caching entirely
    pub cache_class: Option<CacheClass>,
    /// Which limiter gates this route
    pub limiter: LimiterClass,
}

impl RoutePolicy {
    /// A cached route.
    pub fn cached(cache_class: CacheClass, limiter: LimiterClass) -> Self {
        Self {
            cache_class: Some(cache_class),
            limiter,
        }
    }

    /// An uncached route.
    pub fn uncached(limiter: LimiterClass) -> Self {
        Self {
            cache_class: None,
            limiter,
        }
    }
}

/// The pipeline's view of an inbound request.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    /// Request path, e.g. `/api/v1/prices/BTC`
    pub endpoint: String,
    /// HTTP verb
    pub method: String,
    /// Query parameters; normalized (sorted) for cache key derivation
    pub query: Vec<(String, String)>,
    /// Client identity: API key header value, falling back to remote address
    pub client_id: String,
    /// Caller's user agent
    pub user_agent: Option<String>,
    /// Explicit cache bypass (`skip_cache=true`)
    pub bypass_cache: bool,
}

impl PipelineRequest {
    /// A GET request with no query parameters.
    pub fn get(endpoint: &str, client_id: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            method: "GET".to_string(),
            query: Vec::new(),
            client_id: client_id.to_string(),
            user_agent: None,
            bypass_cache: false,
        }
    }

    /// Cache key: path plus the normalized query string.
    pub fn cache_key(&self) -> String {
        if self.query.is_empty() {
            return self.endpoint.clone();
        }
        let mut pairs = self.query.clone();
        pairs.sort();
        let query: Vec<String> = pairs
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        format!("{}?{}", self.endpoint, query.join("&"))
    }

    fn is_read_only(&self) -> bool {
        self.method == "GET"
    }
}

/// A successful handler payload.
///
/// `data` is the designated cacheable field; `metadata` rides along in the
/// envelope but is never cached.
#[derive(Debug, Clone)]
pub struct HandlerOutput {
    /// The payload
    pub data: Value,
    /// Optional envelope metadata
    pub metadata: Option<Value>,
}

impl HandlerOutput {
    /// Payload without metadata.
    pub fn new(data: Value) -> Self {
        Self {
            data,
            metadata: None,
        }
    }

    /// Payload with metadata.
    pub fn with_metadata(data: Value, metadata: Value) -> Self {
        Self {
            data,
            metadata: Some(metadata),
        }
    }
}

/// What a downstream handler produces.
pub type HandlerResult = std::result::Result<HandlerOutput, ApiError>;

/// Quota state exposed to the client on every response.
#[derive(Debug, Clone)]
pub struct QuotaInfo {
    /// The policy's per-window maximum
    pub limit: u32,
    /// Requests left in the current window
    pub remaining: u32,
    /// Window reset time in epoch seconds
    pub reset_epoch_secs: i64,
    /// Present only on rejection
    pub retry_after: Option<u64>,
}

impl From<&Decision> for QuotaInfo {
    fn from(decision: &Decision) -> Self {
        Self {
            limit: decision.limit,
            remaining: decision.remaining,
            reset_epoch_secs: decision.reset_at.timestamp(),
            retry_after: decision.retry_after,
        }
    }
}

/// Terminal pipeline outcome, ready for the transport layer to render.
#[derive(Debug, Clone)]
pub struct PipelineResponse {
    /// HTTP status code
    pub status: u16,
    /// Full response envelope
    pub body: Value,
    /// Rate limit headers for this response
    pub quota: QuotaInfo,
}

/// Orchestrates the cache store, limiters, metrics aggregator, and log sink
/// around a downstream handler.
///
/// All shared components are owned here as explicit instances and injected
/// at construction; nothing is ambient process state.
pub struct RequestPipeline {
    cache: Arc<CacheStore>,
    limiters: Arc<LimiterSet>,
    metrics: Arc<MetricsAggregator>,
    log: Arc<dyn LogSink>,
    clock: Arc<dyn Clock>,
}

impl RequestPipeline {
    /// Wire up a pipeline.
    pub fn new(
        cache: Arc<CacheStore>,
        limiters: Arc<LimiterSet>,
        metrics: Arc<MetricsAggregator>,
        log: Arc<dyn LogSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache,
            limiters,
            metrics,
            log,
            clock,
        }
    }

    /// The shared cache store.
    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// The shared limiter set.
    pub fn limiters(&self) -> &Arc<LimiterSet> {
        &self.limiters
    }

    /// The shared metrics aggregator.
    pub fn metrics(&self) -> &Arc<MetricsAggregator> {
        &self.metrics
    }

    /// Run one request through the pipeline.
    ///
    /// The handler is invoked only when the limiter admits the client and
    /// the cache cannot answer. Its result is stored when the route is
    /// cacheable, the request did not opt out, and the payload carries
    /// non-null data.
    pub async fn execute<F, Fut>(
        &self,
        request: PipelineRequest,
        policy: RoutePolicy,
        handler: F,
    ) -> PipelineResponse
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = HandlerResult>,
    {
        let decision = self.limiters.get(policy.limiter).admit(&request.client_id);
        let quota = QuotaInfo::from(&decision);

        if !decision.allowed {
            let err = ApiError::RateLimited {
                retry_after: decision.retry_after.unwrap_or(0),
            };
            return self
                .finish(&request, err.status_code(), envelope::error(&err), quota, 0, false)
                .await;
        }

        let cacheable = policy.cache_class.is_some()
            && request.is_read_only()
            && !request.bypass_cache;
        let key = request.cache_key();

        if cacheable {
            if let Some(data) = self.cache.get(&key) {
                let body = envelope::success(Source::Cache, data, None);
                return self.finish(&request, 200, body, quota, 0, true).await;
            }
        }

        let start = Instant::now();
        match handler().await {
            Ok(output) => {
                let elapsed = start.elapsed().as_millis() as u64;
                if cacheable && !output.data.is_null() {
                    // cache_class is present whenever cacheable is true
                    if let Some(class) = policy.cache_class {
                        self.cache.set(&key, output.data.clone(), class);
                    }
                }
                let body = envelope::success(Source::Api, output.data, output.metadata);
                self.finish(&request, 200, body, quota, elapsed, false).await
            }
            Err(err) => {
                let elapsed = start.elapsed().as_millis() as u64;
                let body = envelope::error(&err);
                self.finish(&request, err.status_code(), body, quota, elapsed, false)
                    .await
            }
        }
    }

    /// Close out a request: one log entry, one metrics sample, one response.
    async fn finish(
        &self,
        request: &PipelineRequest,
        status: u16,
        body: Value,
        quota: QuotaInfo,
        response_time_ms: u64,
        cache_hit: bool,
    ) -> PipelineResponse {
        let timestamp = self.clock.now();

        let entry = RequestLog {
            id: Uuid::new_v4(),
            endpoint: request.endpoint.clone(),
            method: request.method.clone(),
            status_code: status,
            response_time_ms,
            cache_hit,
            timestamp,
            client_id: request.client_id.clone(),
            user_agent: request.user_agent.clone(),
        };

        if let Err(e) = self.log.record(entry).await {
            warn!(endpoint = %request.endpoint, error = %e, "Request log write failed");
        }

        self.metrics.record(MetricsSample {
            response_time_ms,
            cache_hit,
            status_code: status,
            timestamp,
        });

        PipelineResponse {
            status,
            body,
            quota,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Utc;
    use crate::metrics::MetricsSnapshot;
    use crate::metrics::SnapshotSink;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct MemorySink {
        entries: Mutex<Vec<RequestLog>>,
    }

    #[async_trait]
    impl LogSink for MemorySink {
        async fn record(&self, entry: RequestLog) -> anyhow::Result<()> {
            self.entries.lock().push(entry);
            Ok(())
        }
    }

    struct NullSnapshots;

    impl SnapshotSink for NullSnapshots {
        fn append(&self, _snapshot: MetricsSnapshot) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct Harness {
        clock: Arc<ManualClock>,
        sink: Arc<MemorySink>,
        pipeline: RequestPipeline,
    }

    fn harness() -> Harness {
        let clock: Arc<ManualClock> = Arc::new(ManualClock::new(Utc::now()));
        let sink = Arc::new(MemorySink::default());
        let cache = Arc::new(CacheStore::new(clock.clone()));
        let limiters = Arc::new(LimiterSet::with_defaults(clock.clone()));
        let metrics = Arc::new(MetricsAggregator::new(
            Arc::new(NullSnapshots),
            clock.clone(),
        ));
        let pipeline = RequestPipeline::new(cache, limiters, metrics, sink.clone(), clock.clone());
        Harness {
            clock,
            sink,
            pipeline,
        }
    }

    fn price_policy() -> RoutePolicy {
        RoutePolicy::cached(CacheClass::SinglePrice, LimiterClass::Price)
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let h = harness();
        let request = PipelineRequest::get("/api/v1/prices/BTC", "client");

        let first = h
            .pipeline
            .execute(request.clone(), price_policy(), || async {
                Ok(HandlerOutput::new(json!({"price": 100.0})))
            })
            .await;
        assert_eq!(first.status, 200);
        assert_eq!(first.body["source"], json!("api"));

        let second = h
            .pipeline
            .execute(request, price_policy(), || async {
                panic!("handler must not run on a cache hit")
            })
            .await;
        assert_eq!(second.status, 200);
        assert_eq!(second.body["source"], json!("cache"));
        assert_eq!(second.body["data"]["price"], json!(100.0));
    }

    #[tokio::test]
    async fn test_expired_entry_reinvokes_handler() {
        let h = harness();
        let request = PipelineRequest::get("/api/v1/prices/BTC", "client");

        h.pipeline
            .execute(request.clone(), price_policy(), || async {
                Ok(HandlerOutput::new(json!(1)))
            })
            .await;

        h.clock.advance(chrono::Duration::seconds(16));
        let response = h
            .pipeline
            .execute(request, price_policy(), || async {
                Ok(HandlerOutput::new(json!(2)))
            })
            .await;
        assert_eq!(response.body["source"], json!("api"));
        assert_eq!(response.body["data"], json!(2));
    }

    #[tokio::test]
    async fn test_bypass_skips_read_and_write() {
        let h = harness();
        let mut request = PipelineRequest::get("/api/v1/prices/BTC", "client");

        // Seed the cache through a normal request
        h.pipeline
            .execute(request.clone(), price_policy(), || async {
                Ok(HandlerOutput::new(json!("cached")))
            })
            .await;

        request.bypass_cache = true;
        let response = h
            .pipeline
            .execute(request.clone(), price_policy(), || async {
                Ok(HandlerOutput::new(json!("fresh")))
            })
            .await;
        // Never a hit, even with a live entry for the same key
        assert_eq!(response.body["source"], json!("api"));
        assert_eq!(response.body["data"], json!("fresh"));

        // And no store: the old entry is untouched
        request.bypass_cache = false;
        let after = h
            .pipeline
            .execute(request, price_policy(), || async {
                panic!("entry seeded before bypass must still be live")
            })
            .await;
        assert_eq!(after.body["data"], json!("cached"));
    }

    #[tokio::test]
    async fn test_mutating_method_never_touches_cache() {
        let h = harness();
        let mut request = PipelineRequest::get("/api/v1/prices", "client");
        request.method = "POST".to_string();

        h.pipeline
            .execute(request.clone(), price_policy(), || async {
                Ok(HandlerOutput::new(json!("written")))
            })
            .await;

        assert_eq!(h.pipeline.cache().stats().size, 0);
    }

    #[tokio::test]
    async fn test_null_data_is_not_cached() {
        let h = harness();
        let request = PipelineRequest::get("/api/v1/prices/BTC", "client");

        let response = h
            .pipeline
            .execute(request, price_policy(), || async {
                Ok(HandlerOutput::new(Value::Null))
            })
            .await;
        assert_eq!(response.status, 200);
        assert_eq!(h.pipeline.cache().stats().size, 0);
    }

    #[tokio::test]
    async fn test_handler_error_maps_to_envelope() {
        let h = harness();
        let request = PipelineRequest::get("/api/v1/prices/XXX", "client");

        let response = h
            .pipeline
            .execute(request, price_policy(), || async {
                Err(ApiError::NotFound("Cryptocurrency not found".into()))
            })
            .await;
        assert_eq!(response.status, 404);
        assert_eq!(response.body["error"]["code"], json!("resource_not_found"));
        assert_eq!(h.pipeline.cache().stats().size, 0);
    }

    #[tokio::test]
    async fn test_rejection_never_reaches_handler() {
        let h = harness();
        let policy = price_policy();
        let request = PipelineRequest::get("/api/v1/prices", "client");

        for _ in 0..120 {
            // Bypass so every admit goes through without caching
            let mut r = request.clone();
            r.bypass_cache = true;
            h.pipeline
                .execute(r, policy, || async { Ok(HandlerOutput::new(json!(1))) })
                .await;
        }

        let response = h
            .pipeline
            .execute(request, policy, || async {
                panic!("rejected request must not invoke the handler")
            })
            .await;
        assert_eq!(response.status, 429);
        assert_eq!(response.body["error"]["code"], json!("rate_limit_exceeded"));
        assert!(response.quota.retry_after.unwrap() > 0);

        // Pre-handler rejection logs zero elapsed time
        let entries = h.sink.entries.lock();
        let last = entries.last().unwrap();
        assert_eq!(last.status_code, 429);
        assert_eq!(last.response_time_ms, 0);
    }

    #[tokio::test]
    async fn test_every_terminal_path_logs_once() {
        let h = harness();

        // Miss, hit, error: three requests, three log entries
        let request = PipelineRequest::get("/api/v1/prices/BTC", "client");
        h.pipeline
            .execute(request.clone(), price_policy(), || async {
                Ok(HandlerOutput::new(json!(1)))
            })
            .await;
        h.pipeline
            .execute(request, price_policy(), || async {
                Ok(HandlerOutput::new(json!(1)))
            })
            .await;
        h.pipeline
            .execute(
                PipelineRequest::get("/api/v1/prices/XXX", "client"),
                price_policy(),
                || async { Err(ApiError::Internal("boom".into())) },
            )
            .await;

        let entries = h.sink.entries.lock();
        assert_eq!(entries.len(), 3);
        assert!(!entries[0].cache_hit);
        assert!(entries[1].cache_hit);
        assert_eq!(entries[2].status_code, 500);

        let (total, hits, misses, errors) = h.pipeline.metrics().counters();
        assert_eq!(total, 3);
        assert_eq!(hits + misses, total);
        assert_eq!(errors, 1);
    }

    #[tokio::test]
    async fn test_quota_headers_on_admitted_requests() {
        let h = harness();
        let request = PipelineRequest::get("/api/v1/prices", "client");

        let response = h
            .pipeline
            .execute(request, price_policy(), || async {
                Ok(HandlerOutput::new(json!(1)))
            })
            .await;
        assert_eq!(response.quota.limit, 120);
        assert_eq!(response.quota.remaining, 119);
        assert!(response.quota.reset_epoch_secs > 0);
        assert!(response.quota.retry_after.is_none());
    }

    #[tokio::test]
    async fn test_cache_key_normalizes_query_order() {
        let mut a = PipelineRequest::get("/api/v1/markets", "client");
        a.query = vec![
            ("limit".into(), "10".into()),
            ("currency".into(), "USD".into()),
        ];
        let mut b = PipelineRequest::get("/api/v1/markets", "client");
        b.query = vec![
            ("currency".into(), "USD".into()),
            ("limit".into(), "10".into()),
        ];

        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key(), "/api/v1/markets?currency=USD&limit=10");
    }

    struct FailingLogSink;

    #[async_trait]
    impl LogSink for FailingLogSink {
        async fn record(&self, _entry: RequestLog) -> anyhow::Result<()> {
            anyhow::bail!("sink down")
        }
    }

    #[tokio::test]
    async fn test_log_sink_failure_is_invisible_to_caller() {
        let clock: Arc<ManualClock> = Arc::new(ManualClock::new(Utc::now()));
        let pipeline = RequestPipeline::new(
            Arc::new(CacheStore::new(clock.clone())),
            Arc::new(LimiterSet::with_defaults(clock.clone())),
            Arc::new(MetricsAggregator::new(Arc::new(NullSnapshots), clock.clone())),
            Arc::new(FailingLogSink),
            clock,
        );

        let response = pipeline
            .execute(
                PipelineRequest::get("/api/v1/prices", "client"),
                price_policy(),
                || async { Ok(HandlerOutput::new(json!(1))) },
            )
            .await;
        assert_eq!(response.status, 200);
        // Metrics still saw the sample
        assert_eq!(pipeline.metrics().counters().0, 1);
    }
}
