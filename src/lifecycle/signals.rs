//! OS signal handling.

use super::ShutdownSignal;

/// Resolve on Ctrl+C or when the coordinator fires, whichever comes first.
pub async fn shutdown_signal(mut shutdown: ShutdownSignal) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("Shutdown signal received"),
        _ = shutdown.recv() => tracing::info!("Shutdown requested"),
    }
}
