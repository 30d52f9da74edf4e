//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGINT/SIGTERM to start a graceful shutdown
//! - Translate SIGHUP into a full cache refresh
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP refreshes cached values, it never stops the service

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::resolution::ConfigService;

/// Resolve when the process is asked to stop.
pub async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
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
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}

/// Call [`ConfigService::refresh_all`] on every SIGHUP until shutdown.
#[cfg(unix)]
pub fn spawn_reload_listener(
    service: Arc<ConfigService>,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                received = hangup.recv() => {
                    if received.is_none() {
                        break;
                    }
                    let removed = service.refresh_all();
                    tracing::info!(removed, "SIGHUP received, configuration cache refreshed");
                }
                _ = shutdown.recv() => break,
            }
        }
    }))
}

/// SIGHUP does not exist here; the listener only waits for shutdown.
#[cfg(not(unix))]
pub fn spawn_reload_listener(
    service: Arc<ConfigService>,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        let _service = service;
        let _ = shutdown.recv().await;
    }))
}
