//! Web server for the GHouse backend.

pub mod router;
pub mod state;

pub use router::create_router;
pub use state::{ServerState, Stores};

use std::net::SocketAddr;

use tracing::info;

use ghouse_core::Settings;

/// Start the web server. This is the main entry point.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let bind: SocketAddr = settings
        .bind_addr()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid bind address: {}", settings.bind_addr()))?;

    let state = ServerState::new(settings).await?;

    // Connect the device bridge and start the telemetry relay before
    // accepting clients, so the first subscriber never misses a report
    // that already arrived.
    state.spawn_relay();
    state.init_mqtt().await;

    let app = create_router(state.clone());
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %bind, "GHouse backend listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(crate::shutdown::shutdown_signal())
        .await?;

    crate::shutdown::cleanup_resources(&state).await;
    info!("Server shutdown complete");
    Ok(())
}
