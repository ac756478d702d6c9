//! Greenhouse control handlers: watering, lighting, ventilation.

use axum::{
    extract::{Extension, Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use ghouse_storage::SystemKind;

use super::{ApiError, ServerState, require_operator};
use crate::auth::SessionInfo;
use crate::ws::Envelope;

/// All three system settings.
pub async fn status_handler(State(state): State<ServerState>) -> Result<Json<Value>, ApiError> {
    let settings = state.stores.greenhouse.settings()?;
    Ok(Json(json!({ "systems": settings })))
}

/// Update a system's bounds and auto flag.
#[derive(Debug, Deserialize)]
pub struct UpdateSettingRequest {
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub is_auto: Option<bool>,
}

pub async fn update_settings_handler(
    State(state): State<ServerState>,
    Extension(user): Extension<SessionInfo>,
    Path(system): Path<String>,
    Json(req): Json<UpdateSettingRequest>,
) -> Result<Json<Value>, ApiError> {
    require_operator(&user)?;
    let kind = parse_system(&system)?;

    let mut setting = state.stores.greenhouse.setting(kind)?;
    if let Some(min) = req.min_value {
        setting.min_value = min;
    }
    if let Some(max) = req.max_value {
        setting.max_value = max;
    }
    if setting.min_value > setting.max_value {
        return Err(ApiError::BadRequest(
            "min_value must not exceed max_value".to_string(),
        ));
    }
    if let Some(auto) = req.is_auto {
        setting.is_auto = auto;
    }
    setting.updated_at = chrono::Utc::now().timestamp();
    state.stores.greenhouse.put_setting(&setting)?;

    Ok(Json(json!({ "setting": setting })))
}

/// Set a system's value.
#[derive(Debug, Deserialize)]
pub struct ControlRequest {
    pub value: f64,
}

pub async fn control_handler(
    State(state): State<ServerState>,
    Extension(user): Extension<SessionInfo>,
    Path(system): Path<String>,
    Json(req): Json<ControlRequest>,
) -> Result<Json<Value>, ApiError> {
    require_operator(&user)?;
    let kind = parse_system(&system)?;

    let setting = state
        .stores
        .greenhouse
        .apply_change(kind, req.value, Some(&user.username))?;

    info!(
        user = %user.username,
        system = kind.as_str(),
        value = setting.current_value,
        "Greenhouse system adjusted"
    );

    // Push the set-point to the device; a disconnected broker only loses
    // the command, never the API response.
    if let Err(e) = state
        .bridge
        .publish_command(
            "greenhouse",
            Some(kind.as_str()),
            "set",
            json!({ "value": setting.current_value }),
        )
        .await
    {
        warn!("Greenhouse command not published: {}", e);
    }

    state.registry.send_to_user(
        &user.user_id,
        Envelope::command_response(
            "greenhouse_set",
            "success",
            json!({ "system": kind.as_str(), "value": setting.current_value }),
        ),
    );

    Ok(Json(json!({ "status": "success", "setting": setting })))
}

/// Query parameters for change history.
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// Change history for one system.
pub async fn history_handler(
    State(state): State<ServerState>,
    Path(system): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Value>, ApiError> {
    let kind = parse_system(&system)?;
    let history = state.stores.greenhouse.history(kind, params.limit)?;
    Ok(Json(json!({ "system": kind.as_str(), "history": history })))
}

fn parse_system(name: &str) -> Result<SystemKind, ApiError> {
    SystemKind::parse(name).ok_or_else(|| {
        ApiError::BadRequest(format!(
            "Unknown system '{}'. Expected watering, lighting or ventilation",
            name
        ))
    })
}
