//! Persistent storage for the GHouse backend.
//!
//! Every domain gets its own redb database file and a small typed store on
//! top of it:
//!
//! - [`GreenhouseStore`]: climate system settings and change history
//! - [`ReadingStore`]: air metric samples, thresholds, soil analyses, zones
//! - [`FleetStore`]: drones, charging stations, missions
//! - [`ConveyorStore`]: conveyor state, daily statistics, maintenance log
//! - [`NotificationStore`]: per-user notifications and delivery settings
//!
//! Records are serialized with serde_json; keys are strings ordered so that
//! range scans return history newest-first with `.rev()`.

pub mod conveyor;
pub mod error;
pub mod fleet;
pub mod greenhouse;
pub mod notifications;
pub mod readings;

pub use conveyor::{ConveyorState, ConveyorStore, DailyStat, MaintenanceEntry};
pub use error::{Error, Result};
pub use fleet::{ChargingStation, Drone, DroneMission, DroneStatus, FleetStore, MissionStatus};
pub use greenhouse::{GreenhouseStore, SystemChange, SystemKind, SystemSetting};
pub use notifications::{
    NotificationSettings, NotificationStore, StoredNotification,
};
pub use readings::{AirSample, AirStats, AirThreshold, ReadingStore, SoilSample, SoilZone};

use std::path::Path;
use std::sync::Arc;

/// Open (or create) a redb database at the given path, creating parent
/// directories as needed.
pub(crate) fn open_db(path: &Path) -> Result<Arc<redb::Database>> {
    let db = if path.exists() {
        redb::Database::open(path)?
    } else {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        redb::Database::create(path)?
    };
    Ok(Arc::new(db))
}

/// Build an ordered history key: zero-padded millisecond timestamp, a
/// process-local sequence number (keeps same-millisecond writes in insert
/// order), and the record id.
pub(crate) fn history_key(timestamp_ms: i64, id: &str) -> String {
    static SEQ: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
    let seq = SEQ.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    format!("{:020}:{:010}:{}", timestamp_ms.max(0), seq, id)
}
