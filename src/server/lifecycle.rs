// src/server/lifecycle.rs

//! Waits for a reason to stop, then shuts the server down in order.

use super::initialization::Server;
use anyhow::{Result, anyhow};
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;

/// Runs until SIGINT, SIGTERM or an admin `shutdown`, then stops both
/// listeners. Returns once every connection has been closed.
pub async fn run_until_shutdown(mut server: Server) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow!("Failed to register SIGINT handler: {}", e))?;
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow!("Failed to register SIGTERM handler: {}", e))?;

    tokio::select! {
        _ = sigint.recv() => info!("SIGINT received, initiating graceful shutdown."),
        _ = sigterm.recv() => info!("SIGTERM received, initiating graceful shutdown."),
        _ = server.shutdown_requested() => info!("Shutdown command received, stopping servers."),
    }

    server.stop().await;
    Ok(())
}
