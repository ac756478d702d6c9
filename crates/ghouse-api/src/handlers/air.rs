//! Air quality handlers.

use axum::{
    extract::{Extension, Query, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::{Value, json};

use ghouse_storage::AirThreshold;

use super::{ApiError, ServerState, require_operator};
use crate::auth::SessionInfo;

/// Latest air sample.
pub async fn current_handler(State(state): State<ServerState>) -> Result<Json<Value>, ApiError> {
    match state.stores.readings.latest_air()? {
        Some(sample) => Ok(Json(json!({ "current": sample }))),
        None => Err(ApiError::NotFound("No air samples recorded".to_string())),
    }
}

/// Window query, in hours.
#[derive(Debug, Deserialize)]
pub struct WindowParams {
    #[serde(default = "default_hours")]
    pub hours: i64,
}

fn default_hours() -> i64 {
    24
}

impl WindowParams {
    fn since(&self) -> i64 {
        chrono::Utc::now().timestamp() - self.hours.clamp(1, 24 * 30) * 3600
    }
}

/// Samples over the window, oldest first.
pub async fn history_handler(
    State(state): State<ServerState>,
    Query(params): Query<WindowParams>,
) -> Result<Json<Value>, ApiError> {
    let samples = state.stores.readings.air_since(params.since())?;
    Ok(Json(json!({ "hours": params.hours, "samples": samples })))
}

/// Min/max/avg per metric over the window.
pub async fn analytics_handler(
    State(state): State<ServerState>,
    Query(params): Query<WindowParams>,
) -> Result<Json<Value>, ApiError> {
    let stats = state.stores.readings.air_stats(params.since())?;
    Ok(Json(json!({ "hours": params.hours, "stats": stats })))
}

/// All configured thresholds.
pub async fn thresholds_handler(State(state): State<ServerState>) -> Result<Json<Value>, ApiError> {
    let thresholds = state.stores.readings.thresholds()?;
    Ok(Json(json!({ "thresholds": thresholds })))
}

/// Upsert one threshold.
#[derive(Debug, Deserialize)]
pub struct ThresholdRequest {
    pub metric: String,
    pub min_value: f64,
    pub max_value: f64,
    pub unit: Option<String>,
}

pub async fn update_threshold_handler(
    State(state): State<ServerState>,
    Extension(user): Extension<SessionInfo>,
    Json(req): Json<ThresholdRequest>,
) -> Result<Json<Value>, ApiError> {
    require_operator(&user)?;

    const KNOWN_METRICS: [&str; 4] = ["temperature", "humidity", "co2", "pressure"];
    if !KNOWN_METRICS.contains(&req.metric.as_str()) {
        return Err(ApiError::BadRequest(format!(
            "Unknown metric '{}'",
            req.metric
        )));
    }
    if req.min_value > req.max_value {
        return Err(ApiError::BadRequest(
            "min_value must not exceed max_value".to_string(),
        ));
    }

    let threshold = AirThreshold {
        metric: req.metric,
        min_value: req.min_value,
        max_value: req.max_value,
        unit: req.unit,
        updated_at: chrono::Utc::now().timestamp(),
    };
    state.stores.readings.put_threshold(&threshold)?;
    Ok(Json(json!({ "threshold": threshold })))
}
