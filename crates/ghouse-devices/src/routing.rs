//! Topic routing for the upstream device broker.
//!
//! Topics follow `ghouse/<device-category>/<device-id-or-wildcard>/<kind>`.
//! Classification is substring matching against a fixed table, not full
//! pattern parsing: a topic routes to a category when it contains both the
//! category keyword and the kind keyword.

use serde::{Deserialize, Serialize};

/// The five device categories the bridge understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceCategory {
    Greenhouse,
    Air,
    Drones,
    Conveyor,
    Soil,
}

impl DeviceCategory {
    /// The WebSocket channel telemetry for this category is broadcast on.
    pub fn channel(&self) -> &'static str {
        match self {
            DeviceCategory::Greenhouse => "greenhouse",
            DeviceCategory::Air => "air",
            DeviceCategory::Drones => "drones",
            DeviceCategory::Conveyor => "conveyor",
            DeviceCategory::Soil => "soil",
        }
    }
}

/// Topic patterns subscribed at connect time.
pub const SUBSCRIBE_PATTERNS: [&str; 5] = [
    "ghouse/greenhouse/+/status",
    "ghouse/air/+/metrics",
    "ghouse/drones/+/telemetry",
    "ghouse/conveyor/status",
    "ghouse/soil/+/analysis",
];

// (category keyword, kind keyword) -> category
const ROUTES: [(&str, &str, DeviceCategory); 5] = [
    ("greenhouse", "status", DeviceCategory::Greenhouse),
    ("air", "metrics", DeviceCategory::Air),
    ("drones", "telemetry", DeviceCategory::Drones),
    ("conveyor", "status", DeviceCategory::Conveyor),
    ("soil", "analysis", DeviceCategory::Soil),
];

/// Classify an inbound topic. Returns `None` for topics matching no route;
/// those are silently ignored by the bridge.
pub fn classify(topic: &str) -> Option<DeviceCategory> {
    ROUTES
        .iter()
        .find(|(category, kind, _)| topic.contains(category) && topic.contains(kind))
        .map(|(_, _, route)| *route)
}

/// Command topic for a device. The conveyor is a single line and takes no
/// device id segment.
pub fn command_topic(device_type: &str, device_id: Option<&str>) -> String {
    match device_id {
        Some(id) => format!("ghouse/{}/{}/command", device_type, id),
        None => format!("ghouse/{}/command", device_type),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_topics() {
        assert_eq!(
            classify("ghouse/greenhouse/3/status"),
            Some(DeviceCategory::Greenhouse)
        );
        assert_eq!(classify("ghouse/air/1/metrics"), Some(DeviceCategory::Air));
        assert_eq!(
            classify("ghouse/drones/7/telemetry"),
            Some(DeviceCategory::Drones)
        );
        assert_eq!(
            classify("ghouse/conveyor/status"),
            Some(DeviceCategory::Conveyor)
        );
        assert_eq!(
            classify("ghouse/soil/A/analysis"),
            Some(DeviceCategory::Soil)
        );
    }

    #[test]
    fn test_classify_unroutable() {
        assert_eq!(classify("ghouse/drones/7/command"), None);
        assert_eq!(classify("ghouse/unknown/1/status"), None);
        assert_eq!(classify("other/topic"), None);
    }

    #[test]
    fn test_command_topics() {
        assert_eq!(
            command_topic("drones", Some("7")),
            "ghouse/drones/7/command"
        );
        assert_eq!(command_topic("conveyor", None), "ghouse/conveyor/command");
    }
}
