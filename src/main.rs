use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pricegate::cache::CacheStore;
use pricegate::clock::SystemClock;
use pricegate::config::PricegateConfig;
use pricegate::http::{routes, server, warmup, AppState};
use pricegate::market::MarketDataService;
use pricegate::metrics::MetricsAggregator;
use pricegate::pipeline::RequestPipeline;
use pricegate::ratelimit::LimiterSet;
use pricegate::records::RecordsStore;
use pricegate::tasks::BackgroundTasks;

#[derive(Debug, Parser)]
#[command(name = "pricegate", about = "Gated cryptocurrency price API", version)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Override the configured listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    info!("Starting Pricegate Price API Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => PricegateConfig::from_file(path)?,
        None => PricegateConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    info!(listen_addr = %config.server.listen_addr, "Configuration loaded");

    // Wire up the pipeline components as explicit instances
    let clock = Arc::new(SystemClock);
    let records = Arc::new(RecordsStore::new());
    let cache = Arc::new(CacheStore::with_journal(clock.clone(), records.clone()));
    let limiters = Arc::new(LimiterSet::new(|class| config.policy(class), clock.clone()));
    let metrics = Arc::new(MetricsAggregator::new(records.clone(), clock.clone()));
    let pipeline = Arc::new(RequestPipeline::new(
        cache.clone(),
        limiters.clone(),
        metrics.clone(),
        records,
        clock.clone(),
    ));
    let market = Arc::new(MarketDataService::new(clock));
    info!("Request pipeline initialized");

    if config.cache.warm_on_startup {
        warmup::warm_cache(&pipeline, &market).await;
    }

    let tasks = BackgroundTasks::start(cache, limiters, metrics, config.task_intervals());

    let router = routes::router(AppState { pipeline, market });
    server::serve_with_shutdown(config.server.listen_addr, router, shutdown_signal()).await?;

    tasks.shutdown().await;
    info!("Pricegate Price API Service stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
