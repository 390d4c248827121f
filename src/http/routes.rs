//! Route table: path, cache class, and limiter class per endpoint.

use axum::routing::get;
use axum::Router;

use super::handlers;
use super::AppState;
use crate::cache::CacheClass;
use crate::pipeline::RoutePolicy;
use crate::ratelimit::LimiterClass;

/// `GET /api/v1/prices`
pub const PRICES: RoutePolicy = RoutePolicy {
    cache_class: Some(CacheClass::Prices),
    limiter: LimiterClass::Price,
};

/// `GET /api/v1/prices/{symbol}`
pub const SINGLE_PRICE: RoutePolicy = RoutePolicy {
    cache_class: Some(CacheClass::SinglePrice),
    limiter: LimiterClass::Price,
};

/// `GET /api/v1/history/{symbol}`
pub const HISTORY: RoutePolicy = RoutePolicy {
    cache_class: Some(CacheClass::History),
    limiter: LimiterClass::History,
};

/// `GET /api/v1/markets`
pub const MARKETS: RoutePolicy = RoutePolicy {
    cache_class: Some(CacheClass::Markets),
    limiter: LimiterClass::Standard,
};

/// `GET /api/v1/trending`
pub const TRENDING: RoutePolicy = RoutePolicy {
    cache_class: Some(CacheClass::Trending),
    limiter: LimiterClass::Standard,
};

/// `GET /api/v1/metrics`, never cached
pub const METRICS: RoutePolicy = RoutePolicy {
    cache_class: None,
    limiter: LimiterClass::Standard,
};

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/prices", get(handlers::all_prices))
        .route("/api/v1/prices/{symbol}", get(handlers::price_by_symbol))
        .route("/api/v1/history/{symbol}", get(handlers::historical_prices))
        .route("/api/v1/markets", get(handlers::market_data))
        .route("/api/v1/trending", get(handlers::trending))
        .route("/api/v1/metrics", get(handlers::performance_metrics))
        .fallback(handlers::not_found)
        .with_state(state)
}
