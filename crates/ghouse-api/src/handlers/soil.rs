//! Soil analysis handlers.

use axum::{
    extract::{Extension, Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use ghouse_storage::{SoilSample, SoilZone};

use super::{ApiError, ServerState, require_operator};
use crate::auth::SessionInfo;
use crate::ws::Envelope;

/// Latest analysis per zone.
pub async fn current_handler(State(state): State<ServerState>) -> Result<Json<Value>, ApiError> {
    let zones = state.stores.readings.zones()?;
    let mut current = Vec::new();
    for zone in &zones {
        if let Some(sample) = state.stores.readings.latest_soil(&zone.id)? {
            current.push(json!({ "zone": zone, "analysis": sample }));
        } else {
            current.push(json!({ "zone": zone, "analysis": Value::Null }));
        }
    }
    Ok(Json(json!({ "zones": current })))
}

/// Registered zones.
pub async fn zones_handler(State(state): State<ServerState>) -> Result<Json<Value>, ApiError> {
    let zones = state.stores.readings.zones()?;
    Ok(Json(json!({ "zones": zones })))
}

/// Register or update a zone.
#[derive(Debug, Deserialize)]
pub struct ZoneRequest {
    pub id: String,
    pub name: String,
    pub area_sqm: Option<f64>,
    #[serde(default)]
    pub coordinates: Vec<[f64; 2]>,
}

pub async fn put_zone_handler(
    State(state): State<ServerState>,
    Extension(user): Extension<SessionInfo>,
    Json(req): Json<ZoneRequest>,
) -> Result<Json<Value>, ApiError> {
    require_operator(&user)?;
    let zone = SoilZone {
        id: req.id,
        name: req.name,
        area_sqm: req.area_sqm,
        coordinates: req.coordinates,
    };
    state.stores.readings.put_zone(&zone)?;
    Ok(Json(json!({ "zone": zone })))
}

/// Ask the field devices to run an analysis of one zone.
pub async fn analyze_handler(
    State(state): State<ServerState>,
    Extension(user): Extension<SessionInfo>,
    Path(zone_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    require_operator(&user)?;

    info!(user = %user.username, zone = %zone_id, "Soil analysis requested");
    if let Err(e) = state
        .bridge
        .publish_command("soil", Some(&zone_id), "analyze", json!({}))
        .await
    {
        warn!("Soil command not published: {}", e);
    }

    state.registry.send_to_user(
        &user.user_id,
        Envelope::command_response("analyze", "requested", json!({ "zone_id": zone_id })),
    );

    Ok(Json(json!({ "status": "requested", "zone_id": zone_id })))
}

/// History query.
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// Analyses for one zone, newest first.
pub async fn history_handler(
    State(state): State<ServerState>,
    Path(zone_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Value>, ApiError> {
    let samples = state.stores.readings.soil_history(&zone_id, params.limit)?;
    Ok(Json(json!({ "zone_id": zone_id, "history": samples })))
}

/// Agronomy recommendations for one zone, derived from the latest sample.
pub async fn recommendations_handler(
    State(state): State<ServerState>,
    Path(zone_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let sample = state
        .stores
        .readings
        .latest_soil(&zone_id)?
        .ok_or_else(|| ApiError::NotFound(format!("No analyses for zone '{}'", zone_id)))?;

    let recommendations = recommendations_for(&sample);
    Ok(Json(json!({
        "zone_id": zone_id,
        "analysis": sample,
        "recommendations": recommendations,
    })))
}

// Simple agronomy rules over the latest sample.
fn recommendations_for(sample: &SoilSample) -> Vec<String> {
    let mut recommendations = Vec::new();

    if let Some(moisture) = sample.moisture {
        if moisture < 30.0 {
            recommendations.push("Soil moisture is low: increase watering".to_string());
        } else if moisture > 80.0 {
            recommendations.push("Soil is waterlogged: reduce watering".to_string());
        }
    }

    if let Some(ph) = sample.ph {
        if ph < 5.5 {
            recommendations.push("Soil is acidic: consider liming".to_string());
        } else if ph > 7.5 {
            recommendations.push("Soil is alkaline: consider sulfur amendment".to_string());
        }
    }

    if let Some(n) = sample.npk_n {
        if n < 20.0 {
            recommendations.push("Nitrogen is low: apply nitrogen fertilizer".to_string());
        }
    }
    if let Some(p) = sample.npk_p {
        if p < 10.0 {
            recommendations.push("Phosphorus is low: apply phosphate fertilizer".to_string());
        }
    }
    if let Some(k) = sample.npk_k {
        if k < 15.0 {
            recommendations.push("Potassium is low: apply potash fertilizer".to_string());
        }
    }

    if recommendations.is_empty() {
        recommendations.push("Soil parameters are within optimal ranges".to_string());
    }
    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(moisture: Option<f64>, ph: Option<f64>, n: Option<f64>) -> SoilSample {
        SoilSample {
            zone_id: Some("A".to_string()),
            moisture,
            ph,
            npk_n: n,
            npk_p: None,
            npk_k: None,
            temperature: None,
            conductivity: None,
            status: "optimal".to_string(),
            analyzed_at: 0,
        }
    }

    #[test]
    fn test_recommendations_flag_problems() {
        let recs = recommendations_for(&sample(Some(20.0), Some(5.0), Some(10.0)));
        assert_eq!(recs.len(), 3);
        assert!(recs.iter().any(|r| r.contains("watering")));
        assert!(recs.iter().any(|r| r.contains("liming")));
        assert!(recs.iter().any(|r| r.contains("nitrogen")));
    }

    #[test]
    fn test_recommendations_optimal() {
        let recs = recommendations_for(&sample(Some(50.0), Some(6.5), Some(40.0)));
        assert_eq!(recs.len(), 1);
        assert!(recs[0].contains("optimal"));
    }
}
