//! Memory notification channel (for testing).

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::NotificationChannel;
use super::super::{Error, Notification, Result};

/// In-memory channel for testing.
#[derive(Debug, Clone)]
pub struct MemoryChannel {
    name: String,
    enabled: bool,
    notifications: Arc<Mutex<Vec<Notification>>>,
}

impl MemoryChannel {
    pub fn new(name: String) -> Self {
        Self {
            name,
            enabled: true,
            notifications: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn disabled(name: String) -> Self {
        Self {
            name,
            enabled: false,
            notifications: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.notifications.lock().await.clone()
    }

    pub async fn clear(&self) {
        self.notifications.lock().await.clear();
    }

    pub async fn count(&self) -> usize {
        self.notifications.lock().await.len()
    }
}

#[async_trait]
impl NotificationChannel for MemoryChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &str {
        "memory"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        if !self.enabled {
            return Err(Error::ChannelDisabled(self.name.clone()));
        }
        self.notifications.lock().await.push(notification.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NotificationKind;

    #[tokio::test]
    async fn test_memory_channel_records() {
        let channel = MemoryChannel::new("memory".to_string());
        let notification = Notification::new("alice", NotificationKind::Info, "T", "m");
        channel.send(&notification).await.unwrap();

        assert_eq!(channel.count().await, 1);
        assert_eq!(channel.sent().await[0].title, "T");

        channel.clear().await;
        assert_eq!(channel.count().await, 0);
    }

    #[tokio::test]
    async fn test_memory_channel_disabled() {
        let channel = MemoryChannel::disabled("memory".to_string());
        let notification = Notification::new("alice", NotificationKind::Info, "T", "m");
        assert!(channel.send(&notification).await.is_err());
        assert_eq!(channel.count().await, 0);
    }
}
