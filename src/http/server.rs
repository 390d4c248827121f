//! HTTP server lifecycle.

use axum::Router;
use std::net::SocketAddr;
use tracing::info;

use crate::error::{PricegateError, Result};

/// Serve the router until the shutdown signal resolves.
///
/// Connection info is attached so handlers can fall back to the remote
/// address as the client identity.
pub async fn serve_with_shutdown<F>(addr: SocketAddr, router: Router, signal: F) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Starting HTTP server with graceful shutdown");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(signal)
    .await
    .map_err(|e| PricegateError::Server(e.to_string()))
}
