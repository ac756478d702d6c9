//! Basic handlers: API info and health probes.

use axum::{Json, extract::State};
use serde::Serialize;
use serde_json::json;

use super::ServerState;
use ghouse_devices::ConnectionStatus;

/// Root endpoint: service identity.
pub async fn root_handler() -> Json<serde_json::Value> {
    Json(json!({
        "name": "GHouse Backend API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Monitoring and control API for the GHouse agro facility",
        "health": "/api/v1/health",
    }))
}

/// Dependency health snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyStatus {
    pub storage: bool,
    pub mqtt: bool,
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: &'static str,
    pub uptime: i64,
    pub dependencies: DependencyStatus,
}

/// Health check (public endpoint).
pub async fn health_handler(State(state): State<ServerState>) -> Json<HealthStatus> {
    let storage = state.stores.conveyor.state().is_ok();
    let mqtt = state.bridge.status().await == ConnectionStatus::Connected;

    Json(HealthStatus {
        status: if storage { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.uptime_secs(),
        dependencies: DependencyStatus { storage, mqtt },
    })
}

/// Liveness probe.
pub async fn liveness_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "alive" }))
}

/// Readiness probe: storage must answer; the broker may be down.
pub async fn readiness_handler(State(state): State<ServerState>) -> Json<serde_json::Value> {
    let ready = state.stores.conveyor.state().is_ok();
    Json(json!({ "ready": ready }))
}
