//! Normalized telemetry reports.
//!
//! Each device category has a fixed field subset. Decoding goes through
//! serde with defaults, so extra upstream fields are dropped and missing
//! fields serialize as null in the outbound payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::routing::DeviceCategory;

/// Greenhouse system status: which system reported, its value, its state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GreenhouseStatus {
    pub system: Option<String>,
    pub value: Option<f64>,
    pub status: Option<String>,
}

/// Air quality metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AirMetrics {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub co2: Option<f64>,
    pub pressure: Option<f64>,
}

/// GPS fix carried inside drone telemetry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpsFix {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// Drone telemetry. `drone_id` is passed through as-is; devices report
/// either numeric or string ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DroneTelemetry {
    pub drone_id: Option<Value>,
    pub battery: Option<f64>,
    pub gps: Option<GpsFix>,
    pub altitude: Option<f64>,
    pub speed: Option<f64>,
    pub status: Option<String>,
}

/// Conveyor line status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConveyorStatus {
    pub is_running: Option<bool>,
    pub speed: Option<f64>,
    pub items_transported: Option<u64>,
}

/// Soil analysis for one zone. `npk` is the nutrient triple as reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoilAnalysis {
    pub zone_id: Option<Value>,
    pub moisture: Option<f64>,
    pub ph: Option<f64>,
    pub npk: Option<Value>,
    pub status: Option<String>,
}

/// A decoded, normalized device report.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceReport {
    Greenhouse(GreenhouseStatus),
    Air(AirMetrics),
    Drone(DroneTelemetry),
    Conveyor(ConveyorStatus),
    Soil(SoilAnalysis),
}

impl DeviceReport {
    /// Decode a raw payload for the given category. Returns `None` when the
    /// payload does not fit the category's shape at all (wrong types on
    /// known fields).
    pub fn from_payload(category: DeviceCategory, payload: &Value) -> Option<Self> {
        let report = match category {
            DeviceCategory::Greenhouse => {
                DeviceReport::Greenhouse(serde_json::from_value(payload.clone()).ok()?)
            }
            DeviceCategory::Air => {
                DeviceReport::Air(serde_json::from_value(payload.clone()).ok()?)
            }
            DeviceCategory::Drones => {
                DeviceReport::Drone(serde_json::from_value(payload.clone()).ok()?)
            }
            DeviceCategory::Conveyor => {
                DeviceReport::Conveyor(serde_json::from_value(payload.clone()).ok()?)
            }
            DeviceCategory::Soil => {
                DeviceReport::Soil(serde_json::from_value(payload.clone()).ok()?)
            }
        };
        Some(report)
    }

    /// The category this report belongs to.
    pub fn category(&self) -> DeviceCategory {
        match self {
            DeviceReport::Greenhouse(_) => DeviceCategory::Greenhouse,
            DeviceReport::Air(_) => DeviceCategory::Air,
            DeviceReport::Drone(_) => DeviceCategory::Drones,
            DeviceReport::Conveyor(_) => DeviceCategory::Conveyor,
            DeviceReport::Soil(_) => DeviceCategory::Soil,
        }
    }

    /// The WebSocket channel this report is broadcast on.
    pub fn channel(&self) -> &'static str {
        self.category().channel()
    }

    /// The normalized payload: exactly the category's field subset, with
    /// missing fields as null.
    pub fn payload(&self) -> Value {
        // These structs serialize infallibly.
        match self {
            DeviceReport::Greenhouse(inner) => serde_json::to_value(inner),
            DeviceReport::Air(inner) => serde_json::to_value(inner),
            DeviceReport::Drone(inner) => serde_json::to_value(inner),
            DeviceReport::Conveyor(inner) => serde_json::to_value(inner),
            DeviceReport::Soil(inner) => serde_json::to_value(inner),
        }
        .unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_drone_normalization_exact_subset() {
        let payload = json!({
            "drone_id": 7,
            "battery": 42.0,
            "gps": {"lat": 1.0, "lng": 2.0},
            "altitude": 5,
            "speed": 3,
            "status": "active",
            "extra_field": "dropped",
            "firmware": "1.2.3"
        });

        let report = DeviceReport::from_payload(DeviceCategory::Drones, &payload).unwrap();
        assert_eq!(report.channel(), "drones");

        let normalized = report.payload();
        let obj = normalized.as_object().unwrap();
        assert_eq!(obj.len(), 6);
        assert_eq!(normalized["drone_id"], json!(7));
        assert_eq!(normalized["battery"], json!(42.0));
        assert_eq!(normalized["gps"]["lat"], json!(1.0));
        assert_eq!(normalized["gps"]["lng"], json!(2.0));
        assert_eq!(normalized["status"], json!("active"));
        assert!(obj.get("extra_field").is_none());
    }

    #[test]
    fn test_missing_fields_become_null() {
        let payload = json!({"battery": 10.0});
        let report = DeviceReport::from_payload(DeviceCategory::Drones, &payload).unwrap();
        let normalized = report.payload();
        assert_eq!(normalized["drone_id"], Value::Null);
        assert_eq!(normalized["gps"], Value::Null);
        assert_eq!(normalized["battery"], json!(10.0));
    }

    #[test]
    fn test_air_subset() {
        let payload = json!({
            "temperature": 23.4,
            "humidity": 55.0,
            "co2": 420.0,
            "pressure": 1013.2,
            "sensor_serial": "abc"
        });
        let report = DeviceReport::from_payload(DeviceCategory::Air, &payload).unwrap();
        assert_eq!(report.channel(), "air");
        let normalized = report.payload();
        assert_eq!(normalized.as_object().unwrap().len(), 4);
        assert_eq!(normalized["co2"], json!(420.0));
    }

    #[test]
    fn test_soil_passes_npk_through() {
        let payload = json!({
            "zone_id": "A",
            "moisture": 40.0,
            "ph": 6.5,
            "npk": {"n": 10, "p": 5, "k": 8},
            "status": "optimal"
        });
        let report = DeviceReport::from_payload(DeviceCategory::Soil, &payload).unwrap();
        let normalized = report.payload();
        assert_eq!(normalized["npk"]["n"], json!(10));
    }

    #[test]
    fn test_wrong_field_type_rejected() {
        // battery must be numeric
        let payload = json!({"battery": "full"});
        assert!(DeviceReport::from_payload(DeviceCategory::Drones, &payload).is_none());
    }
}
