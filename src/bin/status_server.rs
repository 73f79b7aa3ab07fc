//! # Import Status Server
//!
//! Serves the live import status WebSocket and a `/health` route.
//!
//! Usage: `status-server [config.toml]`. Without a path the default
//! `config/importer.toml` is used when present; `IMPORTER__*` environment
//! variables override either.

use anyhow::{Context, Result};
use importer_core::broadcast::{status_router, BroadcastManager};
use importer_core::config::ImporterConfig;
use importer_core::logging::init_structured_logging;
use std::path::PathBuf;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = ImporterConfig::load_from(config_path.as_deref())
        .context("failed to load importer configuration")?;

    init_structured_logging(&config.logging, &config.environment);

    let manager = BroadcastManager::new(config.broadcast.clone());
    manager.start();

    let app = status_router(manager.clone(), &config.server.ws_path);
    let listener = tokio::net::TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_address))?;

    info!(
        bind_address = %config.server.bind_address,
        ws_path = %config.server.ws_path,
        environment = %config.environment,
        "Status server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(manager))
        .await
        .context("status server failed")?;

    info!("Status server stopped");
    Ok(())
}

/// Wait for a signal, then close every WebSocket so in-flight connections drain
async fn shutdown_signal(manager: BroadcastManager) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Failed to listen for Ctrl+C");
            }
        }
        _ = wait_for_sigterm() => {}
    }
    info!("Shutdown signal received");
    manager.shutdown();
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "Failed to install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await;
}
