//! Graceful shutdown handling for the web server.

use crate::server::ServerState;

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Clean up resources before exit.
pub async fn cleanup_resources(state: &ServerState) {
    tracing::info!("Cleaning up resources...");

    // Stop the MQTT bridge; redb databases flush on Drop.
    state.bridge.disconnect().await;

    let stats = state.registry.stats();
    tracing::info!(
        connections = stats.total_connections,
        uptime = state.uptime_secs(),
        "Shutdown complete"
    );
}
