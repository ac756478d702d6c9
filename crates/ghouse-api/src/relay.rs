//! Telemetry relay: device bridge → connection registry.
//!
//! A dedicated task consumes the bridge's report stream, persists what the
//! REST API serves, fans the normalized payload out on the report's
//! channel and evaluates air thresholds. Running outside the transport
//! callback keeps the registry lock out of the MQTT poll loop.

use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use ghouse_devices::{AirMetrics, DeviceReport, DroneTelemetry};
use ghouse_messages::NotificationKind;
use ghouse_storage::{AirSample, DroneStatus, SoilSample};

use crate::server::{ServerState, Stores};
use crate::ws::Envelope;

/// Consume bridge reports until the bridge shuts down.
pub async fn run(state: ServerState) {
    let mut reports = state.bridge.subscribe();
    loop {
        match reports.recv().await {
            Ok(report) => handle_report(&state, report).await,
            Err(RecvError::Lagged(missed)) => {
                warn!(missed = missed, "Telemetry relay lagged, reports dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Persist, broadcast and evaluate one report.
pub async fn handle_report(state: &ServerState, report: DeviceReport) {
    if let Err(e) = persist_report(&state.stores, &report) {
        warn!("Failed to persist telemetry: {}", e);
    }

    let channel = report.channel();
    state
        .registry
        .broadcast_to_channel(channel, Envelope::telemetry_update(channel, report.payload()));

    if let DeviceReport::Air(metrics) = &report {
        check_air_thresholds(state, metrics).await;
    }
}

/// Merge a report into the domain stores.
fn persist_report(stores: &Stores, report: &DeviceReport) -> ghouse_storage::Result<()> {
    let now = chrono::Utc::now().timestamp();
    match report {
        DeviceReport::Air(m) => stores.readings.record_air(&AirSample {
            temperature: m.temperature,
            humidity: m.humidity,
            co2: m.co2,
            pressure: m.pressure,
            recorded_at: now,
        }),
        DeviceReport::Drone(t) => {
            let Some(id) = drone_id_string(t) else {
                return Ok(());
            };
            stores.fleet.apply_telemetry(
                &id,
                t.battery,
                t.gps.as_ref().and_then(|g| g.lat.zip(g.lng)),
                t.altitude,
                t.speed,
                t.status.as_deref().and_then(DroneStatus::parse),
            )
        }
        DeviceReport::Conveyor(c) => {
            stores.conveyor.update_state(|conveyor| {
                if let Some(running) = c.is_running {
                    conveyor.is_running = running;
                }
                if let Some(speed) = c.speed {
                    conveyor.speed = speed;
                }
                if let Some(items) = c.items_transported {
                    conveyor.total_transported = items;
                }
            })?;
            Ok(())
        }
        DeviceReport::Soil(s) => stores.readings.record_soil(&SoilSample {
            zone_id: s.zone_id.as_ref().map(json_to_id),
            moisture: s.moisture,
            ph: s.ph,
            npk_n: npk_component(s.npk.as_ref(), "n"),
            npk_p: npk_component(s.npk.as_ref(), "p"),
            npk_k: npk_component(s.npk.as_ref(), "k"),
            temperature: None,
            conductivity: None,
            status: s.status.clone().unwrap_or_else(|| "unknown".to_string()),
            analyzed_at: now,
        }),
        DeviceReport::Greenhouse(g) => {
            let Some(kind) = g
                .system
                .as_deref()
                .and_then(ghouse_storage::SystemKind::parse)
            else {
                return Ok(());
            };
            let mut setting = stores.greenhouse.setting(kind)?;
            if let Some(value) = g.value {
                setting.current_value = setting.clamp(value);
            }
            setting.updated_at = now;
            stores.greenhouse.put_setting(&setting)
        }
    }
}

fn drone_id_string(t: &DroneTelemetry) -> Option<String> {
    t.drone_id.as_ref().map(json_to_id)
}

fn json_to_id(value: &serde_json::Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    }
}

fn npk_component(npk: Option<&serde_json::Value>, key: &str) -> Option<f64> {
    npk?.get(key)?.as_f64()
}

/// Compare air metrics against the stored thresholds. A breach broadcasts
/// an `alert` on the air channel and files a warning for every admin.
async fn check_air_thresholds(state: &ServerState, metrics: &AirMetrics) {
    let readings = [
        ("temperature", metrics.temperature),
        ("humidity", metrics.humidity),
        ("co2", metrics.co2),
        ("pressure", metrics.pressure),
    ];

    for (metric, value) in readings {
        let Some(value) = value else { continue };
        let threshold = match state.stores.readings.threshold(metric) {
            Ok(Some(threshold)) => threshold,
            Ok(None) => continue,
            Err(e) => {
                warn!(metric = metric, "Threshold lookup failed: {}", e);
                continue;
            }
        };
        if !threshold.is_breached(value) {
            continue;
        }

        state.registry.broadcast_to_channel(
            "air",
            Envelope::alert(
                "air",
                json!({
                    "metric": metric,
                    "value": value,
                    "min": threshold.min_value,
                    "max": threshold.max_value,
                    "unit": threshold.unit,
                }),
            ),
        );

        let title = format!("{} out of range", metric);
        let body = format!(
            "Reading {} is outside [{}, {}]",
            value, threshold.min_value, threshold.max_value
        );
        for admin in state.auth.admin_ids().await {
            match state
                .notifications
                .notify(&admin, NotificationKind::Warning, &title, &body, Some("air"))
                .await
            {
                Ok(notification) => {
                    state.registry.send_to_user(
                        &admin,
                        Envelope::notification(
                            serde_json::to_value(&notification).unwrap_or_default(),
                        ),
                    );
                }
                Err(e) => warn!("Failed to file threshold notification: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ghouse_core::Settings;
    use ghouse_devices::DeviceCategory;
    use serde_json::json;

    async fn test_state() -> (tempfile::TempDir, ServerState) {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.server.data_dir = dir.path().to_string_lossy().to_string();
        settings.auth.jwt_secret = Some("test-secret".to_string());
        let state = ServerState::new(settings).await.unwrap();
        (dir, state)
    }

    fn report(category: DeviceCategory, payload: serde_json::Value) -> DeviceReport {
        DeviceReport::from_payload(category, &payload).unwrap()
    }

    #[tokio::test]
    async fn test_air_report_persisted_and_broadcast() {
        let (_dir, state) = test_state().await;

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let id = state.registry.register("alice", tx);
        state.registry.subscribe(id, "air");

        handle_report(
            &state,
            report(
                DeviceCategory::Air,
                json!({"temperature": 21.5, "humidity": 40.0}),
            ),
        )
        .await;

        let latest = state.stores.readings.latest_air().unwrap().unwrap();
        assert_eq!(latest.temperature, Some(21.5));

        let frame = match rx.try_recv().unwrap() {
            axum::extract::ws::Message::Text(text) => {
                serde_json::from_str::<serde_json::Value>(&text).unwrap()
            }
            other => panic!("unexpected frame: {:?}", other),
        };
        assert_eq!(frame["type"], "telemetry_update");
        assert_eq!(frame["channel"], "air");
        assert_eq!(frame["payload"]["temperature"], 21.5);
    }

    #[tokio::test]
    async fn test_threshold_breach_raises_alert_and_notification() {
        let (_dir, state) = test_state().await;

        state
            .stores
            .readings
            .put_threshold(&ghouse_storage::AirThreshold {
                metric: "co2".to_string(),
                min_value: 0.0,
                max_value: 1000.0,
                unit: Some("ppm".to_string()),
                updated_at: 0,
            })
            .unwrap();

        let (admin, _token) = state
            .auth
            .register("admin", "password123", crate::auth::UserRole::Admin)
            .await
            .unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let id = state.registry.register(&admin.id, tx);
        state.registry.subscribe(id, "air");

        handle_report(
            &state,
            report(DeviceCategory::Air, json!({"co2": 1400.0})),
        )
        .await;

        let mut kinds = Vec::new();
        while let Ok(axum::extract::ws::Message::Text(text)) = rx.try_recv() {
            let frame: serde_json::Value = serde_json::from_str(&text).unwrap();
            kinds.push(frame["type"].as_str().unwrap().to_string());
        }
        assert!(kinds.contains(&"telemetry_update".to_string()));
        assert!(kinds.contains(&"alert".to_string()));
        assert!(kinds.contains(&"notification".to_string()));

        assert_eq!(state.notifications.unread_count(&admin.id).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_drone_report_updates_fleet() {
        let (_dir, state) = test_state().await;
        state
            .stores
            .fleet
            .put_drone(&ghouse_storage::Drone::new("7", "Drone-7"))
            .unwrap();

        handle_report(
            &state,
            report(
                DeviceCategory::Drones,
                json!({
                    "drone_id": 7,
                    "battery": 42.0,
                    "gps": {"lat": 1.0, "lng": 2.0},
                    "altitude": 5.0,
                    "speed": 3.0,
                    "status": "active"
                }),
            ),
        )
        .await;

        let drone = state.stores.fleet.drone("7").unwrap().unwrap();
        assert_eq!(drone.battery_level, 42.0);
        assert_eq!(drone.status, ghouse_storage::DroneStatus::Active);
    }

    #[tokio::test]
    async fn test_conveyor_report_merges_state() {
        let (_dir, state) = test_state().await;

        handle_report(
            &state,
            report(
                DeviceCategory::Conveyor,
                json!({"is_running": true, "speed": 1.2, "items_transported": 500}),
            ),
        )
        .await;

        let conveyor = state.stores.conveyor.state().unwrap();
        assert!(conveyor.is_running);
        assert_eq!(conveyor.total_transported, 500);
    }
}
