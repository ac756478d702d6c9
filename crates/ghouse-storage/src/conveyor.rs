//! Conveyor storage: live state, daily statistics and the maintenance log.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::{Result, history_key, open_db};

const STATE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("conveyor_state");
const STATS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("conveyor_daily_stats");
const MAINTENANCE_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("conveyor_maintenance");

// Single conveyor line; the state row lives under a fixed key.
const STATE_KEY: &str = "conveyor";

/// Live conveyor state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConveyorState {
    pub is_running: bool,
    /// Belt speed in m/s.
    pub speed: f64,
    pub interval_seconds: u32,
    pub total_transported: u64,
    pub shift_count: u64,
    pub work_time_seconds: u64,
    pub efficiency: f64,
    pub last_maintenance: Option<i64>,
    pub next_maintenance: Option<i64>,
    pub updated_at: i64,
}

impl Default for ConveyorState {
    fn default() -> Self {
        Self {
            is_running: false,
            speed: 0.0,
            interval_seconds: 0,
            total_transported: 0,
            shift_count: 0,
            work_time_seconds: 0,
            efficiency: 0.0,
            last_maintenance: None,
            next_maintenance: None,
            updated_at: Utc::now().timestamp(),
        }
    }
}

/// Aggregated statistics for one calendar day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyStat {
    /// YYYY-MM-DD
    pub date: String,
    pub items_transported: u64,
    pub work_time_seconds: u64,
    pub avg_speed: f64,
    pub avg_efficiency: f64,
    pub downtime_seconds: u64,
}

/// One maintenance log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceEntry {
    pub id: String,
    pub description: String,
    pub performed_by: Option<String>,
    pub created_at: i64,
}

/// Store for the conveyor subsystem.
pub struct ConveyorStore {
    db: Arc<Database>,
}

impl ConveyorStore {
    /// Open or create the store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            db: open_db(path.as_ref())?,
        })
    }

    /// Current state, defaulting to a stopped conveyor.
    pub fn state(&self) -> Result<ConveyorState> {
        let txn = self.db.begin_read()?;
        match txn.open_table(STATE_TABLE) {
            Ok(table) => match table.get(STATE_KEY)? {
                Some(value) => Ok(serde_json::from_slice(value.value())?),
                None => Ok(ConveyorState::default()),
            },
            Err(redb::TableError::TableDoesNotExist(_)) => Ok(ConveyorState::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the state row.
    pub fn put_state(&self, state: &ConveyorState) -> Result<()> {
        let value = serde_json::to_vec(state)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(STATE_TABLE)?;
            table.insert(STATE_KEY, &*value)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Read-modify-write helper for the state row.
    pub fn update_state(
        &self,
        f: impl FnOnce(&mut ConveyorState),
    ) -> Result<ConveyorState> {
        let mut state = self.state()?;
        f(&mut state);
        state.updated_at = Utc::now().timestamp();
        self.put_state(&state)?;
        Ok(state)
    }

    /// Upsert one day's statistics (keyed by date).
    pub fn put_daily_stat(&self, stat: &DailyStat) -> Result<()> {
        let value = serde_json::to_vec(stat)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(STATS_TABLE)?;
            table.insert(&*stat.date, &*value)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// The most recent `days` of statistics, newest first.
    pub fn daily_stats(&self, days: usize) -> Result<Vec<DailyStat>> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(STATS_TABLE) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut results = Vec::new();
        for entry in table.iter()?.rev().take(days) {
            let (_key, value) = entry?;
            results.push(serde_json::from_slice(value.value())?);
        }
        Ok(results)
    }

    /// Append a maintenance log entry and stamp the state row.
    pub fn log_maintenance(&self, entry: &MaintenanceEntry) -> Result<()> {
        let key = history_key(entry.created_at * 1000, &entry.id);
        let value = serde_json::to_vec(entry)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(MAINTENANCE_TABLE)?;
            table.insert(&*key, &*value)?;
        }
        txn.commit()?;

        self.update_state(|state| {
            state.last_maintenance = Some(entry.created_at);
        })?;
        Ok(())
    }

    /// Maintenance log, newest first.
    pub fn maintenance_log(&self, limit: usize) -> Result<Vec<MaintenanceEntry>> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(MAINTENANCE_TABLE) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut results = Vec::new();
        for entry in table.iter()?.rev().take(limit) {
            let (_key, value) = entry?;
            results.push(serde_json::from_slice(value.value())?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ConveyorStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConveyorStore::open(dir.path().join("conveyor.redb")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_default_state() {
        let (_dir, store) = store();
        let state = store.state().unwrap();
        assert!(!state.is_running);
        assert_eq!(state.total_transported, 0);
    }

    #[test]
    fn test_update_state() {
        let (_dir, store) = store();
        let updated = store
            .update_state(|state| {
                state.is_running = true;
                state.speed = 1.5;
            })
            .unwrap();
        assert!(updated.is_running);

        let reloaded = store.state().unwrap();
        assert_eq!(reloaded.speed, 1.5);
    }

    #[test]
    fn test_maintenance_log_updates_state() {
        let (_dir, store) = store();
        let entry = MaintenanceEntry {
            id: "m1".to_string(),
            description: "belt tension".to_string(),
            performed_by: Some("admin".to_string()),
            created_at: 12345,
        };
        store.log_maintenance(&entry).unwrap();

        let log = store.maintenance_log(10).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].description, "belt tension");
        assert_eq!(store.state().unwrap().last_maintenance, Some(12345));
    }

    #[test]
    fn test_daily_stats_newest_first() {
        let (_dir, store) = store();
        let stat = |date: &str, items: u64| DailyStat {
            date: date.to_string(),
            items_transported: items,
            work_time_seconds: 3600,
            avg_speed: 1.0,
            avg_efficiency: 90.0,
            downtime_seconds: 0,
        };
        store.put_daily_stat(&stat("2026-08-01", 100)).unwrap();
        store.put_daily_stat(&stat("2026-08-02", 200)).unwrap();

        let stats = store.daily_stats(7).unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].date, "2026-08-02");
    }
}
