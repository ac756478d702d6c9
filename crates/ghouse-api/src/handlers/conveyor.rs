//! Conveyor handlers.

use axum::{
    extract::{Extension, Query, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use ghouse_storage::MaintenanceEntry;

use super::{ApiError, ServerState, require_operator};
use crate::auth::SessionInfo;
use crate::ws::Envelope;

/// Current conveyor state.
pub async fn status_handler(State(state): State<ServerState>) -> Result<Json<Value>, ApiError> {
    let conveyor = state.stores.conveyor.state()?;
    Ok(Json(json!({ "conveyor": conveyor })))
}

async fn set_running(
    state: &ServerState,
    user: &SessionInfo,
    running: bool,
) -> Result<Json<Value>, ApiError> {
    let conveyor = state.stores.conveyor.update_state(|c| {
        c.is_running = running;
        if !running {
            c.speed = 0.0;
        }
    })?;

    let command = if running { "start" } else { "stop" };
    info!(user = %user.username, command = command, "Conveyor command issued");

    if let Err(e) = state
        .bridge
        .publish_command("conveyor", None, command, json!({}))
        .await
    {
        warn!("Conveyor command not published: {}", e);
    }

    state.registry.send_to_user(
        &user.user_id,
        Envelope::command_response(command, "success", json!({ "is_running": running })),
    );

    Ok(Json(json!({ "status": "success", "conveyor": conveyor })))
}

/// Start the belt.
pub async fn start_handler(
    State(state): State<ServerState>,
    Extension(user): Extension<SessionInfo>,
) -> Result<Json<Value>, ApiError> {
    require_operator(&user)?;
    set_running(&state, &user, true).await
}

/// Stop the belt.
pub async fn stop_handler(
    State(state): State<ServerState>,
    Extension(user): Extension<SessionInfo>,
) -> Result<Json<Value>, ApiError> {
    require_operator(&user)?;
    set_running(&state, &user, false).await
}

/// Reset the shift counters.
pub async fn reset_handler(
    State(state): State<ServerState>,
    Extension(user): Extension<SessionInfo>,
) -> Result<Json<Value>, ApiError> {
    require_operator(&user)?;
    let conveyor = state.stores.conveyor.update_state(|c| {
        c.shift_count = 0;
        c.work_time_seconds = 0;
    })?;
    info!(user = %user.username, "Conveyor counters reset");
    Ok(Json(json!({ "status": "success", "conveyor": conveyor })))
}

/// Set the belt speed.
#[derive(Debug, Deserialize)]
pub struct SpeedRequest {
    pub speed: f64,
}

pub async fn speed_handler(
    State(state): State<ServerState>,
    Extension(user): Extension<SessionInfo>,
    Json(req): Json<SpeedRequest>,
) -> Result<Json<Value>, ApiError> {
    require_operator(&user)?;
    if !(0.0..=5.0).contains(&req.speed) {
        return Err(ApiError::BadRequest(
            "Speed must be between 0 and 5 m/s".to_string(),
        ));
    }

    let conveyor = state.stores.conveyor.update_state(|c| c.speed = req.speed)?;

    if let Err(e) = state
        .bridge
        .publish_command("conveyor", None, "set_speed", json!({ "speed": req.speed }))
        .await
    {
        warn!("Conveyor command not published: {}", e);
    }

    Ok(Json(json!({ "status": "success", "conveyor": conveyor })))
}

/// Set the transport interval.
#[derive(Debug, Deserialize)]
pub struct IntervalRequest {
    pub interval_seconds: u32,
}

pub async fn interval_handler(
    State(state): State<ServerState>,
    Extension(user): Extension<SessionInfo>,
    Json(req): Json<IntervalRequest>,
) -> Result<Json<Value>, ApiError> {
    require_operator(&user)?;
    let conveyor = state
        .stores
        .conveyor
        .update_state(|c| c.interval_seconds = req.interval_seconds)?;

    if let Err(e) = state
        .bridge
        .publish_command(
            "conveyor",
            None,
            "set_interval",
            json!({ "interval_seconds": req.interval_seconds }),
        )
        .await
    {
        warn!("Conveyor command not published: {}", e);
    }

    Ok(Json(json!({ "status": "success", "conveyor": conveyor })))
}

/// Daily statistics query.
#[derive(Debug, Deserialize)]
pub struct StatisticsParams {
    #[serde(default = "default_days")]
    pub days: usize,
}

fn default_days() -> usize {
    7
}

pub async fn statistics_handler(
    State(state): State<ServerState>,
    Query(params): Query<StatisticsParams>,
) -> Result<Json<Value>, ApiError> {
    let stats = state.stores.conveyor.daily_stats(params.days.clamp(1, 90))?;
    Ok(Json(json!({ "days": params.days, "statistics": stats })))
}

/// Maintenance summary: dates plus the recent log.
pub async fn maintenance_handler(
    State(state): State<ServerState>,
) -> Result<Json<Value>, ApiError> {
    let conveyor = state.stores.conveyor.state()?;
    let log = state.stores.conveyor.maintenance_log(20)?;
    Ok(Json(json!({
        "last_maintenance": conveyor.last_maintenance,
        "next_maintenance": conveyor.next_maintenance,
        "log": log,
    })))
}

/// Record a maintenance action.
#[derive(Debug, Deserialize)]
pub struct MaintenanceRequest {
    pub description: String,
}

pub async fn log_maintenance_handler(
    State(state): State<ServerState>,
    Extension(user): Extension<SessionInfo>,
    Json(req): Json<MaintenanceRequest>,
) -> Result<Json<Value>, ApiError> {
    require_operator(&user)?;
    if req.description.trim().is_empty() {
        return Err(ApiError::BadRequest("Description is required".to_string()));
    }

    let entry = MaintenanceEntry {
        id: uuid::Uuid::new_v4().to_string(),
        description: req.description,
        performed_by: Some(user.username.clone()),
        created_at: chrono::Utc::now().timestamp(),
    };
    state.stores.conveyor.log_maintenance(&entry)?;

    info!(user = %user.username, "Conveyor maintenance logged");
    Ok(Json(json!({ "entry": entry })))
}
