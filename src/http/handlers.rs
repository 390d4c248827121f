//! API endpoint handlers.
//!
//! Each handler translates the HTTP request into a [`PipelineRequest`],
//! validates its parameters, and hands the pipeline a closure that asks the
//! market data service for the payload. Everything else (gating, caching,
//! logging, metrics) happens in the pipeline.

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Json, Response};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;

use super::{routes, AppState};
use crate::error::ApiError;
use crate::market::MarketDataService;
use crate::pipeline::{HandlerOutput, HandlerResult, PipelineRequest};

const VALID_INTERVALS: [&str; 6] = ["1h", "1d", "7d", "30d", "90d", "1y"];

type QueryPairs = Vec<(String, String)>;

/// `GET /api/v1/prices`
pub async fn all_prices(
    State(state): State<AppState>,
    Query(query): Query<QueryPairs>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let request = pipeline_request("/api/v1/prices".to_string(), &query, &headers, addr);
    let market = state.market.clone();

    state
        .pipeline
        .execute(request, routes::PRICES, move || async move {
            let currency = parse_currency(&query)?;
            fetch_all_prices(market, currency).await
        })
        .await
        .into_response()
}

/// `GET /api/v1/prices/{symbol}`
pub async fn price_by_symbol(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(query): Query<QueryPairs>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let endpoint = format!("/api/v1/prices/{}", symbol);
    let request = pipeline_request(endpoint, &query, &headers, addr);
    let market = state.market.clone();

    state
        .pipeline
        .execute(request, routes::SINGLE_PRICE, move || async move {
            let symbol = parse_symbol(&symbol)?;
            parse_currency(&query)?;
            fetch_price(market, symbol).await
        })
        .await
        .into_response()
}

/// `GET /api/v1/history/{symbol}`
pub async fn historical_prices(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(query): Query<QueryPairs>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let endpoint = format!("/api/v1/history/{}", symbol);
    let request = pipeline_request(endpoint, &query, &headers, addr);
    let market = state.market.clone();

    state
        .pipeline
        .execute(request, routes::HISTORY, move || async move {
            let symbol = parse_symbol(&symbol)?;
            let interval = parse_interval(&query)?;
            let limit = parse_limit(&query, 1000, 100)?;
            let currency = parse_currency(&query)?;
            fetch_history(market, symbol, interval, limit, currency).await
        })
        .await
        .into_response()
}

/// `GET /api/v1/markets`
pub async fn market_data(
    State(state): State<AppState>,
    Query(query): Query<QueryPairs>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let request = pipeline_request("/api/v1/markets".to_string(), &query, &headers, addr);
    let market = state.market.clone();

    state
        .pipeline
        .execute(request, routes::MARKETS, move || async move {
            let limit = parse_limit(&query, 1000, 100)?;
            let currency = parse_currency(&query)?;
            fetch_markets(market, limit, currency).await
        })
        .await
        .into_response()
}

/// `GET /api/v1/trending`
pub async fn trending(
    State(state): State<AppState>,
    Query(query): Query<QueryPairs>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let request = pipeline_request("/api/v1/trending".to_string(), &query, &headers, addr);
    let market = state.market.clone();

    state
        .pipeline
        .execute(request, routes::TRENDING, move || async move {
            let limit = parse_limit(&query, 20, 5)?;
            fetch_trending(market, limit).await
        })
        .await
        .into_response()
}

/// `GET /api/v1/metrics`
pub async fn performance_metrics(
    State(state): State<AppState>,
    Query(query): Query<QueryPairs>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let request = pipeline_request("/api/v1/metrics".to_string(), &query, &headers, addr);
    let pipeline = state.pipeline.clone();

    state
        .pipeline
        .execute(request, routes::METRICS, move || async move {
            let snapshot = pipeline.metrics().latest();
            let stats = pipeline.cache().stats();
            let data = json!({
                "avg_response_time_ms": snapshot.avg_response_time_ms,
                "cache_hit_rate_pct": snapshot.cache_hit_rate_pct,
                "requests_per_second": snapshot.requests_per_second,
                "error_rate_pct": snapshot.error_rate_pct,
                "cache_stats": stats,
            });
            Ok(HandlerOutput::new(data))
        })
        .await
        .into_response()
}

/// Fallback for undefined routes.
pub async fn not_found(uri: Uri) -> Response {
    let body = json!({
        "success": false,
        "error": {
            "code": "not_found",
            "message": format!("Route not found: {}", uri.path()),
        }
    });
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

// Payload producers, shared with cache warm-up.

pub(crate) async fn fetch_all_prices(
    market: Arc<MarketDataService>,
    currency: String,
) -> HandlerResult {
    let prices = market.all_prices().await;
    let count = prices.len();
    Ok(HandlerOutput::with_metadata(
        to_value(prices)?,
        json!({"count": count, "currency": currency}),
    ))
}

pub(crate) async fn fetch_price(market: Arc<MarketDataService>, symbol: String) -> HandlerResult {
    let asset = market.price(&symbol).await.ok_or_else(|| {
        ApiError::NotFound(format!("Cryptocurrency with symbol '{}' not found", symbol))
    })?;
    Ok(HandlerOutput::new(to_value(asset)?))
}

pub(crate) async fn fetch_history(
    market: Arc<MarketDataService>,
    symbol: String,
    interval: String,
    limit: usize,
    currency: String,
) -> HandlerResult {
    let points = market
        .history(&symbol, &interval, limit)
        .await
        .ok_or_else(|| {
            ApiError::NotFound(format!("Historical data for symbol '{}' not found", symbol))
        })?;
    let count = points.len();
    Ok(HandlerOutput::with_metadata(
        to_value(points)?,
        json!({
            "symbol": symbol,
            "interval": interval,
            "data_points": count,
            "currency": currency,
        }),
    ))
}

pub(crate) async fn fetch_markets(
    market: Arc<MarketDataService>,
    limit: usize,
    currency: String,
) -> HandlerResult {
    let rows = market.markets(limit).await;
    let count = rows.len();
    Ok(HandlerOutput::with_metadata(
        to_value(rows)?,
        json!({"count": count, "currency": currency}),
    ))
}

pub(crate) async fn fetch_trending(market: Arc<MarketDataService>, limit: usize) -> HandlerResult {
    let assets = market.trending(limit).await;
    let count = assets.len();
    Ok(HandlerOutput::with_metadata(
        to_value(assets)?,
        json!({"count": count}),
    ))
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::Internal(e.to_string()))
}

// Request construction and validation.

fn pipeline_request(
    endpoint: String,
    query: &QueryPairs,
    headers: &HeaderMap,
    addr: SocketAddr,
) -> PipelineRequest {
    let client_id = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|key| key.to_string())
        .unwrap_or_else(|| addr.ip().to_string());

    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(|ua| ua.to_string());

    let bypass_cache = query_param(query, "skip_cache").is_some_and(|v| v == "true");

    PipelineRequest {
        endpoint,
        method: "GET".to_string(),
        query: query.clone(),
        client_id,
        user_agent,
        bypass_cache,
    }
}

fn query_param<'a>(query: &'a QueryPairs, name: &str) -> Option<&'a str> {
    query
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

fn parse_currency(query: &QueryPairs) -> Result<String, ApiError> {
    match query_param(query, "currency") {
        None => Ok("USD".to_string()),
        Some(value) if value.len() == 3 && value.chars().all(|c| c.is_ascii_alphabetic()) => {
            Ok(value.to_uppercase())
        }
        Some(_) => Err(ApiError::Validation("Invalid query parameters".into())),
    }
}

fn parse_limit(query: &QueryPairs, max: usize, default: usize) -> Result<usize, ApiError> {
    match query_param(query, "limit") {
        None => Ok(default),
        Some(value) => match value.parse::<usize>() {
            Ok(limit) if (1..=max).contains(&limit) => Ok(limit),
            _ => Err(ApiError::Validation("Invalid query parameters".into())),
        },
    }
}

fn parse_interval(query: &QueryPairs) -> Result<String, ApiError> {
    match query_param(query, "interval") {
        None => Ok("1d".to_string()),
        Some(value) if VALID_INTERVALS.contains(&value) => Ok(value.to_string()),
        Some(_) => Err(ApiError::Validation("Invalid query parameters".into())),
    }
}

fn parse_symbol(symbol: &str) -> Result<String, ApiError> {
    if (1..=10).contains(&symbol.len()) && symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(symbol.to_uppercase())
    } else {
        Err(ApiError::Validation("Invalid cryptocurrency symbol".into()))
    }
}
