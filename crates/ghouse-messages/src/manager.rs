//! Notification manager.
//!
//! Persists notifications through `ghouse-storage` and dispatches them to
//! the registered delivery channels. Channel delivery is fire-and-forget;
//! the persisted record is the source of truth for the REST API.

use std::path::Path;
use std::sync::Arc;

use ghouse_storage::{NotificationSettings, NotificationStore};

use super::channels::{ChannelRegistry, NotificationChannel};
use super::error::Result;
use super::notification::{Notification, NotificationKind};

/// Manager over the notification store and delivery channels.
#[derive(Clone)]
pub struct NotificationManager {
    store: Arc<NotificationStore>,
    channels: Arc<ChannelRegistry>,
}

impl NotificationManager {
    /// Open the manager with persistence under the given data directory.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let store = Arc::new(NotificationStore::open(
            data_dir.as_ref().join("notifications.redb"),
        )?);
        Ok(Self::with_store(store))
    }

    /// Build the manager over an existing store.
    pub fn with_store(store: Arc<NotificationStore>) -> Self {
        Self {
            store,
            channels: Arc::new(ChannelRegistry::new()),
        }
    }

    /// The underlying store (channels may need it for settings lookups).
    pub fn store(&self) -> Arc<NotificationStore> {
        self.store.clone()
    }

    /// Register a delivery channel.
    pub async fn register_channel(&self, channel: Arc<dyn NotificationChannel>) {
        self.channels.register(channel).await;
    }

    /// Names of the registered channels.
    pub async fn channel_names(&self) -> Vec<String> {
        self.channels.list_names().await
    }

    /// Create a notification: persist it, then dispatch to every enabled
    /// channel. Returns the persisted notification so the caller can push
    /// it over the WebSocket as well.
    pub async fn notify(
        &self,
        user_id: impl Into<String>,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        source: Option<&str>,
    ) -> Result<Notification> {
        let mut notification = Notification::new(user_id, kind, title, message);
        if let Some(source) = source {
            notification = notification.with_source(source);
        }

        self.store.insert(&notification.to_stored())?;
        self.channels.dispatch(&notification).await;
        Ok(notification)
    }

    /// Notifications for a user, newest first.
    pub fn list(
        &self,
        user_id: &str,
        unread_only: bool,
        limit: usize,
    ) -> Result<Vec<Notification>> {
        Ok(self
            .store
            .list(user_id, unread_only, limit)?
            .into_iter()
            .map(Notification::from_stored)
            .collect())
    }

    /// Count of unread notifications.
    pub fn unread_count(&self, user_id: &str) -> Result<u64> {
        Ok(self.store.unread_count(user_id)?)
    }

    /// Mark specific notifications as read; returns the updated count.
    pub fn mark_read(&self, user_id: &str, ids: &[String]) -> Result<u64> {
        Ok(self.store.mark_read(user_id, ids)?)
    }

    /// Mark everything read for a user; returns the updated count.
    pub fn mark_all_read(&self, user_id: &str) -> Result<u64> {
        Ok(self.store.mark_all_read(user_id)?)
    }

    /// Delete one notification. Returns whether it existed.
    pub fn delete(&self, user_id: &str, id: &str) -> Result<bool> {
        Ok(self.store.delete(user_id, id)?)
    }

    /// Delivery settings for a user.
    pub fn settings(&self, user_id: &str) -> Result<NotificationSettings> {
        Ok(self.store.settings(user_id)?)
    }

    /// Update delivery settings.
    pub fn put_settings(&self, settings: &NotificationSettings) -> Result<()> {
        Ok(self.store.put_settings(settings)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::MemoryChannel;

    fn manager() -> (tempfile::TempDir, NotificationManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = NotificationManager::open(dir.path()).unwrap();
        (dir, manager)
    }

    #[tokio::test]
    async fn test_notify_persists_and_dispatches() {
        let (_dir, manager) = manager();
        let memory = Arc::new(MemoryChannel::new("memory".to_string()));
        manager.register_channel(memory.clone()).await;

        let notification = manager
            .notify(
                "alice",
                NotificationKind::Warning,
                "Humidity low",
                "Zone A at 20%",
                Some("air"),
            )
            .await
            .unwrap();

        assert_eq!(notification.source.as_deref(), Some("air"));
        assert_eq!(memory.count().await, 1);

        let listed = manager.list("alice", false, 10).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "Humidity low");
        assert_eq!(manager.unread_count("alice").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_read_flow() {
        let (_dir, manager) = manager();
        let first = manager
            .notify("alice", NotificationKind::Info, "A", "a", None)
            .await
            .unwrap();
        manager
            .notify("alice", NotificationKind::Info, "B", "b", None)
            .await
            .unwrap();

        assert_eq!(
            manager.mark_read("alice", &[first.id.to_string()]).unwrap(),
            1
        );
        assert_eq!(manager.unread_count("alice").unwrap(), 1);
        assert_eq!(manager.mark_all_read("alice").unwrap(), 1);
        assert_eq!(manager.unread_count("alice").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete() {
        let (_dir, manager) = manager();
        let n = manager
            .notify("alice", NotificationKind::Success, "Done", "ok", None)
            .await
            .unwrap();
        assert!(manager.delete("alice", &n.id.to_string()).unwrap());
        assert!(manager.list("alice", false, 10).unwrap().is_empty());
    }
}
