//! Server startup and graceful shutdown
//!
//! On SIGINT or SIGTERM the listener stops accepting connections and in-flight requests,
//! part uploads included, are allowed to finish. The registry sweeper is stopped only after
//! that, followed by one last sweep so no expired session outlives the process.

use anyhow::{Context, Result};
use mediaup_core::Config;
use tokio::task::JoinHandle;

use super::Application;
use crate::services::UploadSessionService;

pub async fn start_server(config: &Config, app: Application) -> Result<()> {
    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!(
        addr = %addr,
        backend = %config.storage.backend,
        chunk_size_bytes = config.upload.chunk_size_bytes,
        direct_size_limit_mb = config.upload.direct_size_limit_bytes / 1024 / 1024,
        server_size_limit_mb = config.upload.server_size_limit_bytes / 1024 / 1024,
        session_ttl_secs = config.upload.session_ttl_secs,
        "Server ready and accepting connections"
    );

    axum::serve(listener, app.router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    stop_background_work(&app.state.uploads, app.sweeper).await;
    tracing::info!("Server stopped");
    Ok(())
}

/// Stop the registry sweeper and run its final pass inline
async fn stop_background_work(uploads: &UploadSessionService, sweeper: JoinHandle<()>) {
    sweeper.abort();
    if let Err(e) = sweeper.await {
        if !e.is_cancelled() {
            tracing::warn!(error = %e, "Upload session sweeper ended abnormally");
        }
    }

    match uploads.sweep_expired().await {
        Ok(removed) => tracing::info!(removed = removed, "Final upload session sweep done"),
        Err(e) => tracing::warn!(error = %e, "Final upload session sweep failed"),
    }
}

async fn shutdown_signal() {
    let signal = wait_for_signal().await;
    tracing::info!(signal = signal, "Shutdown requested, draining in-flight uploads");
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable, only Ctrl+C stops the server");
            return ctrl_c().await;
        }
    };

    tokio::select! {
        name = ctrl_c() => name,
        _ = terminate.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    ctrl_c().await
}

async fn ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Ctrl+C handler unavailable");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}
