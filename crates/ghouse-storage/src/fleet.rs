//! Drone fleet storage: drones, charging stations and mission records.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::{Result, history_key, open_db};

const DRONES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("drones");
const STATIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("charging_stations");
const MISSIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("drone_missions");

/// Drone operational state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DroneStatus {
    Active,
    Charging,
    Returning,
    Offline,
}

impl DroneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DroneStatus::Active => "active",
            DroneStatus::Charging => "charging",
            DroneStatus::Returning => "returning",
            DroneStatus::Offline => "offline",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(DroneStatus::Active),
            "charging" => Some(DroneStatus::Charging),
            "returning" => Some(DroneStatus::Returning),
            "offline" => Some(DroneStatus::Offline),
            _ => None,
        }
    }
}

/// A drone in the fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Drone {
    pub id: String,
    pub name: String,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub status: DroneStatus,
    /// Mounted tool module: grab | spray | soil | charging
    pub current_module: Option<String>,
    pub battery_level: f64,
    pub gps_lat: Option<f64>,
    pub gps_lng: Option<f64>,
    pub altitude: f64,
    pub speed: f64,
    pub last_telemetry_at: Option<i64>,
    pub created_at: i64,
}

impl Drone {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            model: None,
            serial_number: None,
            status: DroneStatus::Offline,
            current_module: None,
            battery_level: 0.0,
            gps_lat: None,
            gps_lng: None,
            altitude: 0.0,
            speed: 0.0,
            last_telemetry_at: None,
            created_at: Utc::now().timestamp(),
        }
    }
}

/// A charging dock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargingStation {
    pub id: String,
    pub name: String,
    pub is_occupied: bool,
    pub occupied_by_drone_id: Option<String>,
    pub charge_level: f64,
    pub updated_at: i64,
}

/// Mission lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// A recorded drone mission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DroneMission {
    pub id: String,
    pub drone_id: String,
    pub mission_type: String,
    pub status: MissionStatus,
    pub waypoints: serde_json::Value,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub created_at: i64,
}

/// Store for the drone fleet.
pub struct FleetStore {
    db: Arc<Database>,
}

impl FleetStore {
    /// Open or create the store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            db: open_db(path.as_ref())?,
        })
    }

    /// Insert or replace a drone record.
    pub fn put_drone(&self, drone: &Drone) -> Result<()> {
        let value = serde_json::to_vec(drone)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(DRONES_TABLE)?;
            table.insert(&*drone.id, &*value)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Fetch one drone.
    pub fn drone(&self, id: &str) -> Result<Option<Drone>> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(DRONES_TABLE) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match table.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// All drones, ordered by id.
    pub fn drones(&self) -> Result<Vec<Drone>> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(DRONES_TABLE) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut results = Vec::new();
        for entry in table.iter()? {
            let (_key, value) = entry?;
            results.push(serde_json::from_slice(value.value())?);
        }
        Ok(results)
    }

    /// Merge live telemetry into a drone record. Unknown drones are ignored
    /// (telemetry for an unregistered drone is not an error).
    pub fn apply_telemetry(
        &self,
        id: &str,
        battery: Option<f64>,
        gps: Option<(f64, f64)>,
        altitude: Option<f64>,
        speed: Option<f64>,
        status: Option<DroneStatus>,
    ) -> Result<()> {
        let Some(mut drone) = self.drone(id)? else {
            return Ok(());
        };

        if let Some(b) = battery {
            drone.battery_level = b;
        }
        if let Some((lat, lng)) = gps {
            drone.gps_lat = Some(lat);
            drone.gps_lng = Some(lng);
        }
        if let Some(a) = altitude {
            drone.altitude = a;
        }
        if let Some(s) = speed {
            drone.speed = s;
        }
        if let Some(s) = status {
            drone.status = s;
        }
        drone.last_telemetry_at = Some(Utc::now().timestamp());
        self.put_drone(&drone)
    }

    /// Insert or replace a charging station.
    pub fn put_station(&self, station: &ChargingStation) -> Result<()> {
        let value = serde_json::to_vec(station)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(STATIONS_TABLE)?;
            table.insert(&*station.id, &*value)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Fetch one station.
    pub fn station(&self, id: &str) -> Result<Option<ChargingStation>> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(STATIONS_TABLE) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match table.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// All charging stations.
    pub fn stations(&self) -> Result<Vec<ChargingStation>> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(STATIONS_TABLE) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut results = Vec::new();
        for entry in table.iter()? {
            let (_key, value) = entry?;
            results.push(serde_json::from_slice(value.value())?);
        }
        Ok(results)
    }

    /// Record a new mission.
    pub fn put_mission(&self, mission: &DroneMission) -> Result<()> {
        let key = format!(
            "{}:{}",
            mission.drone_id,
            history_key(mission.created_at * 1000, &mission.id)
        );
        let value = serde_json::to_vec(mission)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(MISSIONS_TABLE)?;
            table.insert(&*key, &*value)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Missions for one drone, newest first.
    pub fn missions(&self, drone_id: &str, limit: usize) -> Result<Vec<DroneMission>> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(MISSIONS_TABLE) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let start = format!("{}:", drone_id);
        let end = format!("{}:\u{FFFF}", drone_id);
        let mut results = Vec::new();
        for entry in table.range(&*start..=&*end)?.rev().take(limit) {
            let (_key, value) = entry?;
            results.push(serde_json::from_slice(value.value())?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FleetStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FleetStore::open(dir.path().join("fleet.redb")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_drone_roundtrip() {
        let (_dir, store) = store();
        let mut drone = Drone::new("7", "Drone-7");
        drone.status = DroneStatus::Active;
        drone.battery_level = 87.5;
        store.put_drone(&drone).unwrap();

        let loaded = store.drone("7").unwrap().unwrap();
        assert_eq!(loaded.name, "Drone-7");
        assert_eq!(loaded.status, DroneStatus::Active);
        assert!(store.drone("8").unwrap().is_none());
    }

    #[test]
    fn test_apply_telemetry_merges_fields() {
        let (_dir, store) = store();
        store.put_drone(&Drone::new("7", "Drone-7")).unwrap();

        store
            .apply_telemetry(
                "7",
                Some(42.0),
                Some((1.0, 2.0)),
                Some(5.0),
                None,
                Some(DroneStatus::Active),
            )
            .unwrap();

        let drone = store.drone("7").unwrap().unwrap();
        assert_eq!(drone.battery_level, 42.0);
        assert_eq!(drone.gps_lat, Some(1.0));
        assert_eq!(drone.speed, 0.0);
        assert_eq!(drone.status, DroneStatus::Active);
        assert!(drone.last_telemetry_at.is_some());
    }

    #[test]
    fn test_telemetry_for_unknown_drone_is_noop() {
        let (_dir, store) = store();
        store
            .apply_telemetry("missing", Some(10.0), None, None, None, None)
            .unwrap();
        assert!(store.drones().unwrap().is_empty());
    }

    #[test]
    fn test_missions_newest_first() {
        let (_dir, store) = store();
        let mission = |id: &str, at: i64| DroneMission {
            id: id.to_string(),
            drone_id: "7".to_string(),
            mission_type: "survey".to_string(),
            status: MissionStatus::Pending,
            waypoints: serde_json::json!([]),
            started_at: None,
            completed_at: None,
            created_at: at,
        };
        store.put_mission(&mission("m1", 100)).unwrap();
        store.put_mission(&mission("m2", 200)).unwrap();

        let missions = store.missions("7", 10).unwrap();
        assert_eq!(missions.len(), 2);
        assert_eq!(missions[0].id, "m2");
        assert!(store.missions("8", 10).unwrap().is_empty());
    }
}
