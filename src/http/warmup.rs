//! Startup cache warm-up.
//!
//! Pre-fetches the popular endpoints through the pipeline's normal store
//! path so the first real client reads are hits.

use std::sync::Arc;
use tracing::{info, warn};

use super::handlers;
use super::routes;
use crate::market::MarketDataService;
use crate::pipeline::{PipelineRequest, RequestPipeline};

const WARM_SYMBOLS: [&str; 5] = ["BTC", "ETH", "SOL", "DOGE", "ADA"];
const WARM_CLIENT_ID: &str = "internal:warmup";

/// Run the warm-up requests.
pub async fn warm_cache(pipeline: &RequestPipeline, market: &Arc<MarketDataService>) {
    info!("Warming up cache");

    let m = market.clone();
    run(
        pipeline,
        "/api/v1/prices",
        routes::PRICES,
        handlers::fetch_all_prices(m, "USD".to_string()),
    )
    .await;

    // Per-symbol warms are independent, run them together
    futures::future::join_all(WARM_SYMBOLS.iter().map(|symbol| {
        let m = market.clone();
        async move {
            run(
                pipeline,
                &format!("/api/v1/prices/{}", symbol),
                routes::SINGLE_PRICE,
                handlers::fetch_price(m, symbol.to_string()),
            )
            .await;
        }
    }))
    .await;

    let m = market.clone();
    run(
        pipeline,
        "/api/v1/history/BTC",
        routes::HISTORY,
        handlers::fetch_history(m, "BTC".to_string(), "1d".to_string(), 100, "USD".to_string()),
    )
    .await;

    let m = market.clone();
    run(
        pipeline,
        "/api/v1/markets",
        routes::MARKETS,
        handlers::fetch_markets(m, 100, "USD".to_string()),
    )
    .await;

    let m = market.clone();
    run(
        pipeline,
        "/api/v1/trending",
        routes::TRENDING,
        handlers::fetch_trending(m, 5),
    )
    .await;

    info!(
        entries = pipeline.cache().stats().size,
        "Cache warm-up finished"
    );
}

async fn run<Fut>(
    pipeline: &RequestPipeline,
    endpoint: &str,
    policy: crate::pipeline::RoutePolicy,
    fetch: Fut,
) where
    Fut: std::future::Future<Output = crate::pipeline::HandlerResult>,
{
    let request = PipelineRequest::get(endpoint, WARM_CLIENT_ID);
    let response = pipeline.execute(request, policy, || fetch).await;
    if response.status != 200 {
        warn!(endpoint = %endpoint, status = response.status, "Warm-up request failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStore;
    use crate::clock::SystemClock;
    use crate::metrics::MetricsAggregator;
    use crate::ratelimit::LimiterSet;
    use crate::records::RecordsStore;

    #[tokio::test]
    async fn test_warm_cache_populates_popular_endpoints() {
        let clock: Arc<SystemClock> = Arc::new(SystemClock);
        let records = Arc::new(RecordsStore::new());
        let cache = Arc::new(CacheStore::new(clock.clone()));
        let limiters = Arc::new(LimiterSet::with_defaults(clock.clone()));
        let metrics = Arc::new(MetricsAggregator::new(records.clone(), clock.clone()));
        let pipeline =
            RequestPipeline::new(cache, limiters, metrics, records, clock.clone());
        let market = Arc::new(MarketDataService::new(clock).without_latency());

        warm_cache(&pipeline, &market).await;

        let stats = pipeline.cache().stats();
        // prices + 5 symbols + history + markets + trending
        assert_eq!(stats.size, 9);
        assert!(stats.keys.iter().any(|k| k == "/api/v1/prices/BTC"));

        // The next bare read is a hit
        let response = pipeline
            .execute(
                PipelineRequest::get("/api/v1/prices", "client"),
                routes::PRICES,
                || async { panic!("warmed endpoint must be served from cache") },
            )
            .await;
        assert_eq!(response.body["source"], serde_json::json!("cache"));
    }
}
