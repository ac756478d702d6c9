//! Drone fleet handlers.

use axum::{
    extract::{Extension, Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use ghouse_storage::{Drone, DroneMission, DroneStatus, MissionStatus};

use super::{ApiError, ServerState, require_operator};
use crate::auth::SessionInfo;
use crate::ws::Envelope;

/// All drones.
pub async fn list_handler(State(state): State<ServerState>) -> Result<Json<Value>, ApiError> {
    let drones = state.stores.fleet.drones()?;
    Ok(Json(json!({ "drones": drones })))
}

/// One drone.
pub async fn get_handler(
    State(state): State<ServerState>,
    Path(drone_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let drone = find_drone(&state, &drone_id)?;
    Ok(Json(json!({ "drone": drone })))
}

/// Register a new drone (operators).
#[derive(Debug, Deserialize)]
pub struct CreateDroneRequest {
    pub id: String,
    pub name: String,
    pub model: Option<String>,
    pub serial_number: Option<String>,
}

pub async fn create_handler(
    State(state): State<ServerState>,
    Extension(user): Extension<SessionInfo>,
    Json(req): Json<CreateDroneRequest>,
) -> Result<Json<Value>, ApiError> {
    require_operator(&user)?;
    if state.stores.fleet.drone(&req.id)?.is_some() {
        return Err(ApiError::BadRequest(format!(
            "Drone '{}' already exists",
            req.id
        )));
    }

    let mut drone = Drone::new(req.id, req.name);
    drone.model = req.model;
    drone.serial_number = req.serial_number;
    state.stores.fleet.put_drone(&drone)?;
    Ok(Json(json!({ "drone": drone })))
}

/// Live telemetry snapshot for one drone.
pub async fn telemetry_handler(
    State(state): State<ServerState>,
    Path(drone_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let drone = find_drone(&state, &drone_id)?;
    Ok(Json(json!({
        "drone_id": drone.id,
        "battery": drone.battery_level,
        "gps": { "lat": drone.gps_lat, "lng": drone.gps_lng },
        "altitude": drone.altitude,
        "speed": drone.speed,
        "status": drone.status,
        "current_module": drone.current_module,
        "last_update": drone.last_telemetry_at,
    })))
}

/// A drone command.
#[derive(Debug, Deserialize)]
pub struct DroneCommandRequest {
    pub command: String,
    #[serde(default)]
    pub parameters: Value,
}

const VALID_COMMANDS: [&str; 5] = ["navigate", "takeoff", "land", "hover", "return_to_base"];

/// Send a command to a drone: update the local record, publish the MQTT
/// command and acknowledge over the WebSocket.
pub async fn command_handler(
    State(state): State<ServerState>,
    Extension(user): Extension<SessionInfo>,
    Path(drone_id): Path<String>,
    Json(req): Json<DroneCommandRequest>,
) -> Result<Json<Value>, ApiError> {
    require_operator(&user)?;
    if !VALID_COMMANDS.contains(&req.command.as_str()) {
        return Err(ApiError::BadRequest(format!(
            "Unknown command '{}'. Valid: {}",
            req.command,
            VALID_COMMANDS.join(", ")
        )));
    }

    let mut drone = find_drone(&state, &drone_id)?;
    apply_command(&mut drone, &req.command, &req.parameters);
    drone.last_telemetry_at = Some(chrono::Utc::now().timestamp());
    state.stores.fleet.put_drone(&drone)?;

    info!(
        user = %user.username,
        drone = %drone_id,
        command = %req.command,
        "Drone command issued"
    );

    if let Err(e) = state
        .bridge
        .publish_command("drones", Some(&drone_id), &req.command, req.parameters)
        .await
    {
        warn!("Drone command not published: {}", e);
    }

    state.registry.send_to_user(
        &user.user_id,
        Envelope::command_response(
            &req.command,
            "success",
            json!({ "drone_id": drone_id }),
        ),
    );

    Ok(Json(json!({
        "status": "success",
        "drone_id": drone_id,
        "command": req.command,
    })))
}

// Mirror the expected device reaction so the dashboard is fresh before the
// next telemetry arrives.
fn apply_command(drone: &mut Drone, command: &str, parameters: &Value) {
    match command {
        "navigate" => {
            if let Some(lat) = parameters.get("latitude").and_then(Value::as_f64) {
                drone.gps_lat = Some(lat);
            }
            if let Some(lng) = parameters.get("longitude").and_then(Value::as_f64) {
                drone.gps_lng = Some(lng);
            }
            if let Some(altitude) = parameters.get("altitude").and_then(Value::as_f64) {
                drone.altitude = altitude;
            }
            if let Some(speed) = parameters.get("speed").and_then(Value::as_f64) {
                drone.speed = speed;
            }
            drone.status = DroneStatus::Active;
        }
        "takeoff" => {
            drone.status = DroneStatus::Active;
            drone.altitude = 10.0;
        }
        "land" => {
            drone.status = DroneStatus::Returning;
            drone.altitude = 0.0;
            drone.speed = 0.0;
        }
        "hover" => {
            drone.speed = 0.0;
        }
        "return_to_base" => {
            drone.status = DroneStatus::Returning;
            drone.speed = 5.0;
        }
        _ => {}
    }
}

/// Change the mounted tool module.
#[derive(Debug, Deserialize)]
pub struct ModuleChangeRequest {
    pub module_type: String,
}

pub async fn change_module_handler(
    State(state): State<ServerState>,
    Extension(user): Extension<SessionInfo>,
    Path(drone_id): Path<String>,
    Json(req): Json<ModuleChangeRequest>,
) -> Result<Json<Value>, ApiError> {
    require_operator(&user)?;

    const VALID_MODULES: [&str; 4] = ["grab", "spray", "soil", "charging"];
    if !VALID_MODULES.contains(&req.module_type.as_str()) {
        return Err(ApiError::BadRequest(format!(
            "Invalid module type. Valid: {}",
            VALID_MODULES.join(", ")
        )));
    }

    let mut drone = find_drone(&state, &drone_id)?;
    let previous = drone.current_module.take();
    drone.current_module = Some(req.module_type.clone());
    state.stores.fleet.put_drone(&drone)?;

    info!(
        user = %user.username,
        drone = %drone_id,
        from = previous.as_deref().unwrap_or("-"),
        to = %req.module_type,
        "Drone module changed"
    );

    Ok(Json(json!({
        "status": "success",
        "drone_id": drone_id,
        "previous_module": previous,
        "new_module": req.module_type,
    })))
}

/// Create a mission for a drone.
#[derive(Debug, Deserialize)]
pub struct MissionRequest {
    #[serde(default = "default_mission_type")]
    pub mission_type: String,
    #[serde(default)]
    pub waypoints: Value,
}

fn default_mission_type() -> String {
    "survey".to_string()
}

pub async fn create_mission_handler(
    State(state): State<ServerState>,
    Extension(user): Extension<SessionInfo>,
    Path(drone_id): Path<String>,
    Json(req): Json<MissionRequest>,
) -> Result<Json<Value>, ApiError> {
    require_operator(&user)?;
    find_drone(&state, &drone_id)?;

    let mission = DroneMission {
        id: uuid::Uuid::new_v4().to_string(),
        drone_id: drone_id.clone(),
        mission_type: req.mission_type,
        status: MissionStatus::Pending,
        waypoints: req.waypoints,
        started_at: None,
        completed_at: None,
        created_at: chrono::Utc::now().timestamp(),
    };
    state.stores.fleet.put_mission(&mission)?;

    info!(user = %user.username, drone = %drone_id, mission = %mission.id, "Mission created");
    Ok(Json(json!({ "mission": mission })))
}

/// Mission history query.
#[derive(Debug, Deserialize)]
pub struct MissionHistoryParams {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

pub async fn mission_history_handler(
    State(state): State<ServerState>,
    Path(drone_id): Path<String>,
    Query(params): Query<MissionHistoryParams>,
) -> Result<Json<Value>, ApiError> {
    let missions = state.stores.fleet.missions(&drone_id, params.limit)?;
    Ok(Json(json!({ "drone_id": drone_id, "missions": missions })))
}

/// All charging stations.
pub async fn stations_handler(State(state): State<ServerState>) -> Result<Json<Value>, ApiError> {
    let stations = state.stores.fleet.stations()?;
    Ok(Json(json!({ "stations": stations })))
}

/// One charging station.
pub async fn station_status_handler(
    State(state): State<ServerState>,
    Path(station_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match state.stores.fleet.station(&station_id)? {
        Some(station) => Ok(Json(json!({ "station": station }))),
        None => Err(ApiError::NotFound(format!(
            "Charging station '{}' not found",
            station_id
        ))),
    }
}

fn find_drone(state: &ServerState, drone_id: &str) -> Result<Drone, ApiError> {
    state
        .stores
        .fleet
        .drone(drone_id)?
        .ok_or_else(|| ApiError::NotFound(format!("Drone '{}' not found", drone_id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_command_transitions() {
        let mut drone = Drone::new("7", "Drone-7");

        apply_command(&mut drone, "takeoff", &json!({}));
        assert_eq!(drone.status, DroneStatus::Active);
        assert_eq!(drone.altitude, 10.0);

        apply_command(
            &mut drone,
            "navigate",
            &json!({"latitude": 55.75, "longitude": 37.61, "speed": 4.0}),
        );
        assert_eq!(drone.gps_lat, Some(55.75));
        assert_eq!(drone.speed, 4.0);

        apply_command(&mut drone, "land", &json!({}));
        assert_eq!(drone.status, DroneStatus::Returning);
        assert_eq!(drone.altitude, 0.0);
        assert_eq!(drone.speed, 0.0);
    }
}
