use crate::error::{EngineError, EngineResult};
use tracing::info;

/// Wait for SIGINT or SIGTERM, for embedding processes that want to drive
/// [`crate::Engine::stop`] from a signal.
pub async fn wait_for_shutdown_signal() -> EngineResult<()> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(|e| EngineError::internal(format!("Failed to setup SIGTERM handler: {e}")))?;

    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
        .map_err(|e| EngineError::internal(format!("Failed to setup SIGINT handler: {e}")))?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("📡 Received SIGINT shutdown signal");
        }
        _ = sigterm.recv() => {
            info!("📡 Received SIGTERM shutdown signal");
        }
    }

    Ok(())
}
