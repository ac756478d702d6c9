//! Notification storage: per-user notification records and delivery
//! settings.
//!
//! The record here is the persisted shape; the richer model and the
//! delivery pipeline live in `ghouse-messages`.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::{Result, history_key, open_db};

const NOTIFICATIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("notifications");
const SETTINGS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("notification_settings");

/// Persisted notification record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredNotification {
    pub id: String,
    pub user_id: String,
    /// info | warning | error | success
    pub kind: String,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub source: Option<String>,
    pub created_at: i64,
}

/// Per-user delivery preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub user_id: String,
    pub telegram_enabled: bool,
    pub telegram_chat_id: Option<String>,
    pub notify_error: bool,
    pub notify_warning: bool,
    pub notify_info: bool,
}

impl NotificationSettings {
    pub fn default_for(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            telegram_enabled: false,
            telegram_chat_id: None,
            notify_error: true,
            notify_warning: true,
            notify_info: false,
        }
    }
}

/// Store for notifications.
pub struct NotificationStore {
    db: Arc<Database>,
}

impl NotificationStore {
    /// Open or create the store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            db: open_db(path.as_ref())?,
        })
    }

    fn key(user_id: &str, created_at: i64, id: &str) -> String {
        format!("{}:{}", user_id, history_key(created_at * 1000, id))
    }

    /// Append a notification record.
    pub fn insert(&self, record: &StoredNotification) -> Result<()> {
        let key = Self::key(&record.user_id, record.created_at, &record.id);
        let value = serde_json::to_vec(record)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(NOTIFICATIONS_TABLE)?;
            table.insert(&*key, &*value)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Notifications for a user, newest first. `unread_only` filters out
    /// already-read records.
    pub fn list(
        &self,
        user_id: &str,
        unread_only: bool,
        limit: usize,
    ) -> Result<Vec<StoredNotification>> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(NOTIFICATIONS_TABLE) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let start = format!("{}:", user_id);
        let end = format!("{}:\u{FFFF}", user_id);
        let mut results = Vec::new();
        for entry in table.range(&*start..=&*end)?.rev() {
            let (_key, value) = entry?;
            let record: StoredNotification = serde_json::from_slice(value.value())?;
            if unread_only && record.is_read {
                continue;
            }
            results.push(record);
            if results.len() >= limit {
                break;
            }
        }
        Ok(results)
    }

    /// Count of unread notifications for a user.
    pub fn unread_count(&self, user_id: &str) -> Result<u64> {
        Ok(self.list(user_id, true, usize::MAX)?.len() as u64)
    }

    /// Mark specific notifications as read. Unknown ids are ignored.
    /// Returns the number of records updated.
    pub fn mark_read(&self, user_id: &str, ids: &[String]) -> Result<u64> {
        self.mark_read_where(user_id, |record| ids.contains(&record.id))
    }

    /// Mark every notification for a user as read.
    pub fn mark_all_read(&self, user_id: &str) -> Result<u64> {
        self.mark_read_where(user_id, |_| true)
    }

    fn mark_read_where(
        &self,
        user_id: &str,
        predicate: impl Fn(&StoredNotification) -> bool,
    ) -> Result<u64> {
        let start = format!("{}:", user_id);
        let end = format!("{}:\u{FFFF}", user_id);

        let txn = self.db.begin_write()?;
        let mut updated = 0u64;
        {
            let mut table = txn.open_table(NOTIFICATIONS_TABLE)?;

            // Collect first: redb range handles borrow the table.
            let mut pending: Vec<(String, Vec<u8>)> = Vec::new();
            for entry in table.range(&*start..=&*end)? {
                let (key, value) = entry?;
                let mut record: StoredNotification = serde_json::from_slice(value.value())?;
                if !record.is_read && predicate(&record) {
                    record.is_read = true;
                    pending.push((key.value().to_string(), serde_json::to_vec(&record)?));
                }
            }
            for (key, value) in pending {
                table.insert(&*key, &*value)?;
                updated += 1;
            }
        }
        txn.commit()?;
        Ok(updated)
    }

    /// Delete a notification by id. Returns whether a record was removed.
    pub fn delete(&self, user_id: &str, id: &str) -> Result<bool> {
        let start = format!("{}:", user_id);
        let end = format!("{}:\u{FFFF}", user_id);

        let txn = self.db.begin_write()?;
        let mut removed = false;
        {
            let mut table = txn.open_table(NOTIFICATIONS_TABLE)?;
            let mut target: Option<String> = None;
            for entry in table.range(&*start..=&*end)? {
                let (key, value) = entry?;
                let record: StoredNotification = serde_json::from_slice(value.value())?;
                if record.id == id {
                    target = Some(key.value().to_string());
                    break;
                }
            }
            if let Some(key) = target {
                table.remove(&*key)?;
                removed = true;
            }
        }
        txn.commit()?;
        Ok(removed)
    }

    /// Delivery settings for a user (defaults when never configured).
    pub fn settings(&self, user_id: &str) -> Result<NotificationSettings> {
        let txn = self.db.begin_read()?;
        match txn.open_table(SETTINGS_TABLE) {
            Ok(table) => match table.get(user_id)? {
                Some(value) => Ok(serde_json::from_slice(value.value())?),
                None => Ok(NotificationSettings::default_for(user_id)),
            },
            Err(redb::TableError::TableDoesNotExist(_)) => {
                Ok(NotificationSettings::default_for(user_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write delivery settings.
    pub fn put_settings(&self, settings: &NotificationSettings) -> Result<()> {
        let value = serde_json::to_vec(settings)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SETTINGS_TABLE)?;
            table.insert(&*settings.user_id, &*value)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// All users with Telegram delivery enabled and a chat id configured.
    pub fn telegram_subscribers(&self) -> Result<Vec<NotificationSettings>> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(SETTINGS_TABLE) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut results = Vec::new();
        for entry in table.iter()? {
            let (_key, value) = entry?;
            let settings: NotificationSettings = serde_json::from_slice(value.value())?;
            if settings.telegram_enabled && settings.telegram_chat_id.is_some() {
                results.push(settings);
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, NotificationStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = NotificationStore::open(dir.path().join("notifications.redb")).unwrap();
        (dir, store)
    }

    fn record(id: &str, user: &str, at: i64) -> StoredNotification {
        StoredNotification {
            id: id.to_string(),
            user_id: user.to_string(),
            kind: "info".to_string(),
            title: "title".to_string(),
            message: "message".to_string(),
            is_read: false,
            source: None,
            created_at: at,
        }
    }

    #[test]
    fn test_list_scoped_to_user() {
        let (_dir, store) = store();
        store.insert(&record("n1", "alice", 100)).unwrap();
        store.insert(&record("n2", "alice", 200)).unwrap();
        store.insert(&record("n3", "bob", 150)).unwrap();

        let alice = store.list("alice", false, 10).unwrap();
        assert_eq!(alice.len(), 2);
        assert_eq!(alice[0].id, "n2");
        assert_eq!(store.list("bob", false, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_mark_read_and_unread_count() {
        let (_dir, store) = store();
        store.insert(&record("n1", "alice", 100)).unwrap();
        store.insert(&record("n2", "alice", 200)).unwrap();
        assert_eq!(store.unread_count("alice").unwrap(), 2);

        let updated = store.mark_read("alice", &["n1".to_string()]).unwrap();
        assert_eq!(updated, 1);
        assert_eq!(store.unread_count("alice").unwrap(), 1);

        store.mark_all_read("alice").unwrap();
        assert_eq!(store.unread_count("alice").unwrap(), 0);
    }

    #[test]
    fn test_delete() {
        let (_dir, store) = store();
        store.insert(&record("n1", "alice", 100)).unwrap();
        assert!(store.delete("alice", "n1").unwrap());
        assert!(!store.delete("alice", "n1").unwrap());
        assert!(store.list("alice", false, 10).unwrap().is_empty());
    }

    #[test]
    fn test_settings_defaults_and_subscribers() {
        let (_dir, store) = store();
        let defaults = store.settings("alice").unwrap();
        assert!(!defaults.telegram_enabled);
        assert!(defaults.notify_error);

        let mut settings = NotificationSettings::default_for("alice");
        settings.telegram_enabled = true;
        settings.telegram_chat_id = Some("12345".to_string());
        store.put_settings(&settings).unwrap();

        let subscribers = store.telegram_subscribers().unwrap();
        assert_eq!(subscribers.len(), 1);
        assert_eq!(subscribers[0].user_id, "alice");
    }
}
