//! cg-server: HTTP API server and asynchronous conversion jobs.
//!
//! This crate ties the other cg-* crates together into a running server
//! application. It provides:
//!
//! - The [`jobs::JobRegistry`] that runs conversions in the background,
//!   fans their progress out to subscribers, and purges them after a TTL
//! - Axum-based HTTP API with multipart upload, SSE progress, and result
//!   download
//! - Graceful shutdown via signal handling

pub mod context;
pub mod error;
pub mod jobs;
pub mod router;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use cg_core::config::Config;
use tokio_util::sync::CancellationToken;

use crate::context::AppContext;

/// Start the clipgif server.
///
/// Discovers the engine, constructs the [`AppContext`], and serves HTTP until
/// a shutdown signal is received or `cancel` is triggered.
pub async fn start(config: Config, cancel: CancellationToken) -> cg_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let work_dir = config.jobs.work_dir();
    std::fs::create_dir_all(&work_dir)?;
    tracing::info!("Scratch directory {}", work_dir.display());

    // Discover external tools.
    let tools = Arc::new(cg_av::ToolRegistry::discover(&config.tools));
    for info in tools.check_all() {
        if info.available {
            tracing::info!(
                "Tool found: {} ({})",
                info.name,
                info.version.as_deref().unwrap_or("unknown version")
            );
        } else {
            tracing::warn!("Tool not found: {}", info.name);
        }
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| cg_core::Error::Internal(format!("Invalid server address: {e}")))?;

    let static_dir = config.server.static_dir.clone();
    let ctx = AppContext::new(config, tools);
    let app = router::build_router(ctx, static_dir);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| cg_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;
    tracing::info!("Listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM) or cancellation.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => {}
    }

    tracing::info!("Shutdown signal received");
}
