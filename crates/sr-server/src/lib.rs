//! sr-server: HTTP proxy server and compatibility job supervisor.
//!
//! This crate ties the other sr-* crates together into a running server:
//!
//! - Axum-based `/proxy` endpoint that follows redirects, rewrites HLS
//!   playlists and streams everything else through
//! - `/start-compat` plus a static file service for ffmpeg-produced
//!   renditions, backed by a content-addressed [`jobs::JobSupervisor`]
//! - Background sweeper that evicts idle jobs
//! - Graceful shutdown via signal handling

pub mod context;
pub mod error;
pub mod fetcher;
pub mod inspect;
pub mod jobs;
pub mod middleware;
pub mod resolver;
pub mod router;
pub mod routes;
pub mod streamer;

use std::net::SocketAddr;
use std::sync::Arc;

use sr_core::config::Config;
use tokio_util::sync::CancellationToken;

use crate::context::AppContext;

/// Start the streamrelay server.
///
/// Discovers tools, prepares the compat output directory, starts the job
/// sweeper and serves HTTP until a shutdown signal arrives. Every job is
/// stopped before returning.
pub async fn start(config: Config) -> sr_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    // Discover external tools.
    let tools = Arc::new(sr_av::ToolRegistry::discover(&config.tools));
    for info in tools.check_all().await {
        if info.available {
            tracing::info!(
                "Tool found: {} ({})",
                info.name,
                info.version.as_deref().unwrap_or("unknown version")
            );
        } else {
            tracing::warn!("Tool not found: {}; compat renditions need it", info.name);
        }
    }

    let output_root = &config.compat.output_root;
    tokio::fs::create_dir_all(output_root).await?;
    tracing::info!("Compat output under {}", output_root.display());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| sr_core::Error::Internal(format!("Invalid server address: {e}")))?;

    let ctx = AppContext::new(config, tools)?;
    let cancel = CancellationToken::new();

    let sweep_interval = ctx.config.compat.sweep_interval();
    let sweeper = if sweep_interval.is_zero() {
        None
    } else {
        Some(ctx.jobs.start_sweeper(sweep_interval, cancel.clone()))
    };

    let app = router::build_router(ctx.clone());
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| sr_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;
    let local = listener.local_addr()?;
    tracing::info!("Listening on {local}");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await;

    // Signal background tasks to stop.
    cancel.cancel();
    if let Some(sweeper) = sweeper {
        let _ = sweeper.await;
    }
    ctx.jobs.shutdown().await;

    served?;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM) or cancellation.
pub async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
