//! Device Bridge for the GHouse backend.
//!
//! Connects to the upstream MQTT broker, decodes device telemetry from the
//! fixed `ghouse/...` topic set, normalizes each payload into a
//! [`DeviceReport`] and fans the reports out over a broadcast channel. The
//! API server consumes that channel and pushes `telemetry_update` frames to
//! WebSocket subscribers.
//!
//! The symmetric path publishes device commands back to the broker.

pub mod bridge;
pub mod report;
pub mod routing;

pub use bridge::{BridgeConfig, BridgeError, ConnectionStatus, DeviceBridge};
pub use report::{
    AirMetrics, ConveyorStatus, DeviceReport, DroneTelemetry, GpsFix, GreenhouseStatus,
    SoilAnalysis,
};
pub use routing::{DeviceCategory, SUBSCRIBE_PATTERNS, classify, command_topic};
