//! Delivery channels for notifications.

pub mod console;
pub mod memory;
pub mod telegram;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{Notification, Result};

pub use console::ConsoleChannel;
pub use memory::MemoryChannel;
pub use telegram::TelegramChannel;

/// Trait for notification channels.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Get the channel name.
    fn name(&self) -> &str;

    /// Get the channel type.
    fn channel_type(&self) -> &str;

    /// Check if the channel is enabled.
    fn is_enabled(&self) -> bool;

    /// Deliver a notification through this channel. A channel may decide a
    /// given notification is not deliverable for its target (for example a
    /// user without a Telegram chat configured); that is an `Ok(())`
    /// no-op, not an error.
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Channel registry for managing delivery channels.
pub struct ChannelRegistry {
    channels: RwLock<HashMap<String, Arc<dyn NotificationChannel>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Register a channel instance.
    pub async fn register(&self, channel: Arc<dyn NotificationChannel>) {
        let name = channel.name().to_string();
        self.channels.write().await.insert(name, channel);
    }

    /// Unregister a channel by name.
    pub async fn unregister(&self, name: &str) -> bool {
        self.channels.write().await.remove(name).is_some()
    }

    /// Get a channel by name.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn NotificationChannel>> {
        self.channels.read().await.get(name).cloned()
    }

    /// List all channel names.
    pub async fn list_names(&self) -> Vec<String> {
        self.channels.read().await.keys().cloned().collect()
    }

    /// Deliver a notification through every enabled channel. Per-channel
    /// failures are logged and swallowed; delivery is fire-and-forget.
    pub async fn dispatch(&self, notification: &Notification) {
        let channels: Vec<Arc<dyn NotificationChannel>> =
            self.channels.read().await.values().cloned().collect();

        for channel in channels {
            if !channel.is_enabled() {
                continue;
            }
            if let Err(e) = channel.send(notification).await {
                tracing::warn!(
                    channel = channel.name(),
                    notification = %notification.id,
                    "Notification delivery failed: {}",
                    e
                );
            }
        }
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NotificationKind;

    #[tokio::test]
    async fn test_dispatch_skips_disabled_and_survives_failure() {
        let registry = ChannelRegistry::new();
        let ok = Arc::new(MemoryChannel::new("ok".to_string()));
        let disabled = Arc::new(MemoryChannel::disabled("off".to_string()));
        registry.register(ok.clone()).await;
        registry.register(disabled.clone()).await;

        let notification =
            Notification::new("alice", NotificationKind::Info, "Title", "Body");
        registry.dispatch(&notification).await;

        assert_eq!(ok.count().await, 1);
        assert_eq!(disabled.count().await, 0);
    }

    #[tokio::test]
    async fn test_register_unregister() {
        let registry = ChannelRegistry::new();
        registry
            .register(Arc::new(MemoryChannel::new("m".to_string())))
            .await;
        assert_eq!(registry.list_names().await, vec!["m".to_string()]);
        assert!(registry.unregister("m").await);
        assert!(!registry.unregister("m").await);
    }
}
