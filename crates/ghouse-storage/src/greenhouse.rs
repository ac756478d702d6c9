//! Greenhouse climate system storage.
//!
//! Tracks the three controllable systems (watering, lighting, ventilation)
//! with their current/target values and an append-only change history.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::{Result, history_key, open_db};

const SETTINGS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("greenhouse_settings");
const HISTORY_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("greenhouse_history");

/// A controllable greenhouse system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemKind {
    Watering,
    Lighting,
    Ventilation,
}

impl SystemKind {
    pub const ALL: [SystemKind; 3] = [
        SystemKind::Watering,
        SystemKind::Lighting,
        SystemKind::Ventilation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SystemKind::Watering => "watering",
            SystemKind::Lighting => "lighting",
            SystemKind::Ventilation => "ventilation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "watering" => Some(SystemKind::Watering),
            "lighting" => Some(SystemKind::Lighting),
            "ventilation" => Some(SystemKind::Ventilation),
            _ => None,
        }
    }
}

/// Current configuration of one system. Values are percentages (0-100)
/// unless the min/max bounds say otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSetting {
    pub system: SystemKind,
    pub current_value: f64,
    pub target_value: f64,
    pub min_value: f64,
    pub max_value: f64,
    pub is_auto: bool,
    pub updated_at: i64,
}

impl SystemSetting {
    /// Default setting for a system that has never been configured.
    pub fn initial(system: SystemKind) -> Self {
        Self {
            system,
            current_value: 0.0,
            target_value: 0.0,
            min_value: 0.0,
            max_value: 100.0,
            is_auto: false,
            updated_at: Utc::now().timestamp(),
        }
    }

    /// Clamp a requested value into this system's configured bounds.
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min_value, self.max_value)
    }
}

/// One recorded change to a system value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemChange {
    pub id: String,
    pub system: SystemKind,
    pub previous_value: Option<f64>,
    pub new_value: f64,
    pub changed_by: Option<String>,
    pub created_at: i64,
}

/// Store for greenhouse system settings and history.
pub struct GreenhouseStore {
    db: Arc<Database>,
}

impl GreenhouseStore {
    /// Open or create the store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            db: open_db(path.as_ref())?,
        })
    }

    /// Fetch one system's setting, or its initial value if never written.
    pub fn setting(&self, system: SystemKind) -> Result<SystemSetting> {
        let txn = self.db.begin_read()?;
        match txn.open_table(SETTINGS_TABLE) {
            Ok(table) => match table.get(system.as_str())? {
                Some(value) => Ok(serde_json::from_slice(value.value())?),
                None => Ok(SystemSetting::initial(system)),
            },
            // Table absent means nothing was ever written.
            Err(redb::TableError::TableDoesNotExist(_)) => Ok(SystemSetting::initial(system)),
            Err(e) => Err(e.into()),
        }
    }

    /// All three system settings.
    pub fn settings(&self) -> Result<Vec<SystemSetting>> {
        SystemKind::ALL.iter().map(|s| self.setting(*s)).collect()
    }

    /// Write a full setting record.
    pub fn put_setting(&self, setting: &SystemSetting) -> Result<()> {
        let value = serde_json::to_vec(setting)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SETTINGS_TABLE)?;
            table.insert(setting.system.as_str(), &*value)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Set a system to a new value (clamped into its bounds), recording the
    /// change in history. Returns the updated setting.
    pub fn apply_change(
        &self,
        system: SystemKind,
        value: f64,
        changed_by: Option<&str>,
    ) -> Result<SystemSetting> {
        let mut setting = self.setting(system)?;
        let previous = setting.current_value;
        let clamped = setting.clamp(value);

        setting.current_value = clamped;
        setting.target_value = clamped;
        setting.updated_at = Utc::now().timestamp();
        self.put_setting(&setting)?;

        let change = SystemChange {
            id: uuid::Uuid::new_v4().to_string(),
            system,
            previous_value: Some(previous),
            new_value: clamped,
            changed_by: changed_by.map(str::to_string),
            created_at: setting.updated_at,
        };
        self.record_change(&change)?;

        Ok(setting)
    }

    fn record_change(&self, change: &SystemChange) -> Result<()> {
        let key = format!(
            "{}:{}",
            change.system.as_str(),
            history_key(change.created_at * 1000, &change.id)
        );
        let value = serde_json::to_vec(change)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(HISTORY_TABLE)?;
            table.insert(&*key, &*value)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Change history for one system, newest first.
    pub fn history(&self, system: SystemKind, limit: usize) -> Result<Vec<SystemChange>> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(HISTORY_TABLE) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let start = format!("{}:", system.as_str());
        let end = format!("{}:\u{FFFF}", system.as_str());

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

    fn store() -> (tempfile::TempDir, GreenhouseStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = GreenhouseStore::open(dir.path().join("greenhouse.redb")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_initial_settings() {
        let (_dir, store) = store();
        let settings = store.settings().unwrap();
        assert_eq!(settings.len(), 3);
        assert!(settings.iter().all(|s| s.current_value == 0.0));
    }

    #[test]
    fn test_apply_change_clamps_and_records() {
        let (_dir, store) = store();

        let updated = store
            .apply_change(SystemKind::Watering, 150.0, Some("admin"))
            .unwrap();
        assert_eq!(updated.current_value, 100.0);

        let history = store.history(SystemKind::Watering, 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].new_value, 100.0);
        assert_eq!(history[0].previous_value, Some(0.0));
        assert_eq!(history[0].changed_by.as_deref(), Some("admin"));

        // Other systems keep their own (empty) history.
        assert!(store.history(SystemKind::Lighting, 10).unwrap().is_empty());
    }

    #[test]
    fn test_history_newest_first() {
        let (_dir, store) = store();
        store.apply_change(SystemKind::Lighting, 30.0, None).unwrap();
        store.apply_change(SystemKind::Lighting, 60.0, None).unwrap();

        let history = store.history(SystemKind::Lighting, 10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].new_value, 60.0);
        assert_eq!(history[1].new_value, 30.0);
    }
}
