//! MQTT device bridge.
//!
//! Owns the connection to the upstream broker. On connect it subscribes to
//! the fixed topic set and spawns a poll task that decodes, classifies and
//! normalizes every inbound publish, then fans the resulting
//! [`DeviceReport`]s out over a broadcast channel. Payloads that fail to
//! decode are logged and dropped; unroutable topics are ignored. Neither
//! reaches the channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde_json::Value;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, error, info, warn};

use ghouse_core::config::MqttSettings;

use crate::report::DeviceReport;
use crate::routing::{SUBSCRIBE_PATTERNS, classify, command_topic};

/// Capacity of the report fan-out channel.
const REPORT_CHANNEL_CAPACITY: usize = 1024;

/// Consecutive poll errors tolerated before the bridge gives up.
const MAX_POLL_ERRORS: u32 = 5;

/// Bridge errors.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("bridge is not connected")]
    NotConnected,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<BridgeError> for ghouse_core::Error {
    fn from(e: BridgeError) -> Self {
        ghouse_core::Error::Device(e.to_string())
    }
}

/// Upstream connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub broker: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
}

impl BridgeConfig {
    pub fn from_settings(settings: &MqttSettings) -> Self {
        Self {
            broker: settings.broker.clone(),
            port: settings.port,
            username: settings.username.clone(),
            password: settings.password.clone(),
            client_id: settings.client_id.clone(),
        }
    }
}

/// The device bridge.
pub struct DeviceBridge {
    config: BridgeConfig,
    report_tx: broadcast::Sender<DeviceReport>,
    client: RwLock<Option<AsyncClient>>,
    status: Arc<RwLock<ConnectionStatus>>,
    running: Arc<AtomicBool>,
}

impl DeviceBridge {
    /// Create a bridge in the disconnected state.
    pub fn new(config: BridgeConfig) -> Self {
        let (report_tx, _) = broadcast::channel(REPORT_CHANNEL_CAPACITY);
        Self {
            config,
            report_tx,
            client: RwLock::new(None),
            status: Arc::new(RwLock::new(ConnectionStatus::Disconnected)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribe to the normalized report stream.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceReport> {
        self.report_tx.subscribe()
    }

    /// Current upstream connection state.
    pub async fn status(&self) -> ConnectionStatus {
        *self.status.read().await
    }

    /// Connect to the broker, subscribe to all device topics and start the
    /// poll task.
    pub async fn connect(&self) -> Result<(), BridgeError> {
        let mut options =
            MqttOptions::new(&self.config.client_id, &self.config.broker, self.config.port);
        options.set_keep_alive(Duration::from_secs(60));
        if let (Some(user), Some(pass)) = (&self.config.username, &self.config.password) {
            options.set_credentials(user, pass);
        }

        let (client, mut eventloop) = AsyncClient::new(options, 10);

        *self.status.write().await = ConnectionStatus::Connecting;
        self.running.store(true, Ordering::SeqCst);

        for pattern in SUBSCRIBE_PATTERNS {
            client.subscribe(pattern, QoS::AtLeastOnce).await?;
            debug!(topic = pattern, "Subscribed to device topic");
        }

        *self.client.write().await = Some(client);

        let report_tx = self.report_tx.clone();
        let status = self.status.clone();
        let running = self.running.clone();
        let broker = format!("{}:{}", self.config.broker, self.config.port);

        tokio::spawn(async move {
            let mut error_count = 0u32;

            while running.load(Ordering::SeqCst) {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        error_count = 0;
                        *status.write().await = ConnectionStatus::Connected;
                        info!(broker = %broker, "Connected to MQTT broker");
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        error_count = 0;
                        if let Some(report) =
                            Self::route_message(&publish.topic, &publish.payload)
                        {
                            // No receivers is fine; reports are best-effort.
                            let _ = report_tx.send(report);
                        }
                    }
                    Ok(_) => {
                        error_count = 0;
                    }
                    Err(e) => {
                        error_count += 1;
                        *status.write().await = ConnectionStatus::Disconnected;
                        if error_count >= MAX_POLL_ERRORS {
                            error!(
                                broker = %broker,
                                errors = error_count,
                                "MQTT error limit reached, stopping bridge: {}",
                                e
                            );
                            break;
                        }
                        warn!(
                            broker = %broker,
                            attempt = error_count,
                            "MQTT poll error: {}",
                            e
                        );
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }

            *status.write().await = ConnectionStatus::Disconnected;
            info!(broker = %broker, "MQTT bridge stopped");
        });

        Ok(())
    }

    /// Decode + classify + normalize one inbound message. Returns `None`
    /// for malformed payloads and unroutable topics.
    fn route_message(topic: &str, payload: &[u8]) -> Option<DeviceReport> {
        let category = classify(topic)?;

        let value: Value = match serde_json::from_slice(payload) {
            Ok(value) => value,
            Err(e) => {
                warn!(topic = topic, "Dropping undecodable device payload: {}", e);
                return None;
            }
        };

        match DeviceReport::from_payload(category, &value) {
            Some(report) => Some(report),
            None => {
                warn!(topic = topic, "Dropping payload with unexpected shape");
                None
            }
        }
    }

    /// Publish a command to a device: `{command, parameters, timestamp}` on
    /// the device's command topic.
    pub async fn publish_command(
        &self,
        device_type: &str,
        device_id: Option<&str>,
        command: &str,
        parameters: Value,
    ) -> Result<(), BridgeError> {
        let client = self.client.read().await;
        let client = client.as_ref().ok_or(BridgeError::NotConnected)?;

        let topic = command_topic(device_type, device_id);
        let message = serde_json::json!({
            "command": command,
            "parameters": parameters,
            "timestamp": Utc::now().to_rfc3339(),
        });
        let payload = serde_json::to_vec(&message)?;

        client
            .publish(&topic, QoS::AtLeastOnce, false, payload)
            .await?;
        debug!(topic = %topic, command = command, "Published device command");
        Ok(())
    }

    /// Stop the poll task and disconnect from the broker.
    pub async fn disconnect(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(client) = self.client.write().await.take() {
            let _ = client.disconnect().await;
        }
        *self.status.write().await = ConnectionStatus::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::DeviceReport;
    use serde_json::json;

    #[test]
    fn test_route_message_drone_telemetry() {
        let payload = serde_json::to_vec(&json!({
            "drone_id": 7,
            "battery": 42.0,
            "gps": {"lat": 1.0, "lng": 2.0},
            "altitude": 5,
            "speed": 3,
            "status": "active"
        }))
        .unwrap();

        let report = DeviceBridge::route_message("ghouse/drones/7/telemetry", &payload).unwrap();
        assert!(matches!(report, DeviceReport::Drone(_)));
        assert_eq!(report.channel(), "drones");

        let normalized = report.payload();
        assert_eq!(
            normalized.as_object().unwrap().len(),
            6,
            "exactly the drone field subset"
        );
    }

    #[test]
    fn test_route_message_malformed_payload_dropped() {
        let report = DeviceBridge::route_message("ghouse/air/1/metrics", b"not json {{");
        assert!(report.is_none());
    }

    #[test]
    fn test_route_message_unroutable_topic_ignored() {
        let payload = serde_json::to_vec(&json!({"x": 1})).unwrap();
        assert!(DeviceBridge::route_message("ghouse/unknown/topic", &payload).is_none());
    }

    #[tokio::test]
    async fn test_new_bridge_is_disconnected() {
        let bridge = DeviceBridge::new(BridgeConfig {
            broker: "localhost".to_string(),
            port: 1883,
            username: None,
            password: None,
            client_id: "test".to_string(),
        });
        assert_eq!(bridge.status().await, ConnectionStatus::Disconnected);
        assert!(
            bridge
                .publish_command("drones", Some("7"), "takeoff", json!({}))
                .await
                .is_err()
        );
    }
}
