//! ogproxy server entry point.
//!
//! Boots the HTTP server that turns `GET /<url>` into the page's Open Graph
//! record. Logging goes to stderr as JSON.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use ogproxy_client::{BackgroundTasks, CacheAside, FetchConfig, HttpTransport};
use ogproxy_core::{AppConfig, CacheDb};

mod error;
mod routes;
mod state;

use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ogproxy=info,tower_http=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;
    tracing::info!(db_path = %config.db_path.display(), upstream_cache = config.use_upstream_cache, "configuration loaded");

    let db = CacheDb::open(&config.db_path)
        .await
        .with_context(|| format!("failed to open cache at {}", config.db_path.display()))?;
    let transport = HttpTransport::new(FetchConfig::from(&config))?;

    let tasks = BackgroundTasks::new();
    let cacher = CacheAside::new(Arc::new(db), Arc::new(transport), tasks.clone());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!("Starting ogproxy on {}", config.bind_addr);

    let app = routes::router(AppState::new(cacher, config));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!(pending = tasks.pending(), "shutting down, waiting for cache writes");
    tasks.flush().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}
