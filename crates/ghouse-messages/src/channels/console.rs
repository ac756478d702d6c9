//! Console notification channel.

use async_trait::async_trait;

use super::NotificationChannel;
use super::super::{Error, Notification, Result};

/// Console channel that writes notifications to the log.
#[derive(Debug, Clone)]
pub struct ConsoleChannel {
    name: String,
    enabled: bool,
}

impl ConsoleChannel {
    pub fn new(name: String) -> Self {
        Self {
            name,
            enabled: true,
        }
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }
}

#[async_trait]
impl NotificationChannel for ConsoleChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &str {
        "console"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        if !self.enabled {
            return Err(Error::ChannelDisabled(self.name.clone()));
        }

        tracing::info!(
            user = %notification.user_id,
            kind = notification.kind.as_str(),
            source = notification.source.as_deref().unwrap_or("-"),
            "{}: {}",
            notification.title,
            notification.message
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NotificationKind;

    #[tokio::test]
    async fn test_console_channel() {
        let channel = ConsoleChannel::new("console".to_string());
        let notification =
            Notification::new("alice", NotificationKind::Warning, "Test", "message");
        channel.send(&notification).await.unwrap();
    }

    #[tokio::test]
    async fn test_console_channel_disabled() {
        let mut channel = ConsoleChannel::new("console".to_string());
        channel.disable();
        let notification = Notification::new("alice", NotificationKind::Info, "Test", "message");
        assert!(channel.send(&notification).await.is_err());
    }
}
