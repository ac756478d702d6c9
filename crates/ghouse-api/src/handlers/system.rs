//! System handlers: runtime stats and redacted configuration.

use axum::{
    extract::{Extension, State},
    response::Json,
};
use serde_json::{Value, json};

use super::{ApiError, ServerState, require_admin};
use crate::auth::SessionInfo;

/// Runtime statistics: uptime, WebSocket fan-out counters, bridge state.
pub async fn stats_handler(State(state): State<ServerState>) -> Result<Json<Value>, ApiError> {
    let ws = state.registry.stats();
    Ok(Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": state.uptime_secs(),
        "websocket": ws,
        "mqtt": state.bridge.status().await,
    })))
}

/// Effective configuration with secrets removed (admin only).
pub async fn config_handler(
    State(state): State<ServerState>,
    Extension(admin): Extension<SessionInfo>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&admin)?;
    let settings = &state.settings;
    Ok(Json(json!({
        "server": {
            "host": settings.server.host,
            "port": settings.server.port,
            "data_dir": settings.server.data_dir,
        },
        "mqtt": {
            "broker": settings.mqtt.broker,
            "port": settings.mqtt.port,
            "client_id": settings.mqtt.client_id,
            "authenticated": settings.mqtt.username.is_some(),
        },
        "telegram": {
            "configured": settings.telegram.is_configured(),
        },
    })))
}
