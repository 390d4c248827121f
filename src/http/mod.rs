//! HTTP surface: routing, extraction, and envelope/header rendering.

pub mod handlers;
pub mod routes;
pub mod server;
pub mod warmup;

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use std::sync::Arc;

use crate::market::MarketDataService;
use crate::pipeline::{PipelineResponse, RequestPipeline};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// The request pipeline every API call runs through
    pub pipeline: Arc<RequestPipeline>,
    /// The downstream market data service
    pub market: Arc<MarketDataService>,
}

impl IntoResponse for PipelineResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let quota = self.quota;

        let mut response = (status, Json(self.body)).into_response();
        let headers = response.headers_mut();
        headers.insert("x-ratelimit-limit", HeaderValue::from(quota.limit));
        headers.insert("x-ratelimit-remaining", HeaderValue::from(quota.remaining));
        headers.insert("x-ratelimit-reset", HeaderValue::from(quota.reset_epoch_secs));
        if let Some(retry_after) = quota.retry_after {
            headers.insert("retry-after", HeaderValue::from(retry_after));
        }
        response
    }
}
