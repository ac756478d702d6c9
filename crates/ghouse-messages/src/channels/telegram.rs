//! Telegram notification channel.
//!
//! Talks to the Telegram Bot API over HTTPS. Per-user delivery is gated by
//! the user's stored notification settings: Telegram must be enabled, a
//! chat id configured, and the notification kind allowed.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

use ghouse_storage::{NotificationSettings, NotificationStore};

use super::NotificationChannel;
use super::super::{Error, Notification, NotificationKind, Result};

/// Outcome of a chat broadcast.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct BroadcastReport {
    pub sent: u64,
    pub failed: u64,
    pub errors: Vec<String>,
}

/// Telegram Bot API channel.
pub struct TelegramChannel {
    name: String,
    enabled: bool,
    base_url: String,
    client: reqwest::Client,
    store: Arc<NotificationStore>,
}

impl TelegramChannel {
    pub fn new(bot_token: &str, store: Arc<NotificationStore>) -> Self {
        Self {
            name: "telegram".to_string(),
            enabled: true,
            base_url: format!("https://api.telegram.org/bot{}", bot_token),
            client: reqwest::Client::new(),
            store,
        }
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Whether a notification passes a user's delivery settings.
    pub fn deliverable(settings: &NotificationSettings, kind: NotificationKind) -> bool {
        if !settings.telegram_enabled || settings.telegram_chat_id.is_none() {
            return false;
        }
        match kind {
            NotificationKind::Error => settings.notify_error,
            NotificationKind::Warning => settings.notify_warning,
            NotificationKind::Info | NotificationKind::Success => settings.notify_info,
        }
    }

    /// Format a notification as Telegram HTML.
    pub fn format(notification: &Notification) -> String {
        format!(
            "{} <b>{}</b>\n\n{}\n\n<i>GHouse Dashboard</i>\n<code>{}</code>",
            notification.kind.emoji(),
            notification.title,
            notification.message,
            notification.created_at.format("%Y-%m-%d %H:%M:%S"),
        )
    }

    async fn call(&self, method: &str, payload: Value) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, method);
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::SendFailed(format!("Telegram request failed: {}", e)))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::SendFailed(format!("Telegram response unreadable: {}", e)))?;

        if body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            Ok(body.get("result").cloned().unwrap_or(Value::Null))
        } else {
            Err(Error::SendFailed(format!("Telegram API error: {}", body)))
        }
    }

    /// Send raw HTML text to a chat.
    pub async fn send_text(&self, chat_id: &str, text: &str) -> Result<()> {
        self.call(
            "sendMessage",
            json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "HTML",
            }),
        )
        .await?;
        tracing::debug!(chat_id = chat_id, "Sent Telegram message");
        Ok(())
    }

    /// Bot identity, for the status endpoint.
    pub async fn get_me(&self) -> Result<Value> {
        self.call("getMe", json!({})).await
    }

    /// Register the webhook URL for bot updates.
    pub async fn set_webhook(&self, url: &str) -> Result<()> {
        self.call(
            "setWebhook",
            json!({
                "url": url,
                "allowed_updates": ["message", "callback_query"],
            }),
        )
        .await?;
        Ok(())
    }

    /// Remove the webhook registration.
    pub async fn delete_webhook(&self) -> Result<()> {
        self.call("deleteWebhook", json!({})).await?;
        Ok(())
    }

    /// Send the same text to many chats, counting outcomes. A failed chat
    /// never aborts the remaining sends.
    pub async fn broadcast(&self, chat_ids: &[String], text: &str) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for chat_id in chat_ids {
            match self.send_text(chat_id, text).await {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    report.failed += 1;
                    report.errors.push(format!("{}: {}", chat_id, e));
                }
            }
        }
        tracing::info!(
            sent = report.sent,
            failed = report.failed,
            "Telegram broadcast finished"
        );
        report
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &str {
        "telegram"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        if !self.enabled {
            return Err(Error::ChannelDisabled(self.name.clone()));
        }

        let settings = self.store.settings(&notification.user_id)?;
        if !Self::deliverable(&settings, notification.kind) {
            // Not an error: the user opted out or never set up a chat.
            return Ok(());
        }

        // deliverable() guarantees the chat id.
        let chat_id = settings.telegram_chat_id.as_deref().unwrap_or_default();
        self.send_text(chat_id, &Self::format(notification)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(enabled: bool, chat: Option<&str>) -> NotificationSettings {
        NotificationSettings {
            user_id: "alice".to_string(),
            telegram_enabled: enabled,
            telegram_chat_id: chat.map(str::to_string),
            notify_error: true,
            notify_warning: true,
            notify_info: false,
        }
    }

    #[test]
    fn test_deliverable_gating() {
        let s = settings(true, Some("42"));
        assert!(TelegramChannel::deliverable(&s, NotificationKind::Error));
        assert!(TelegramChannel::deliverable(&s, NotificationKind::Warning));
        assert!(!TelegramChannel::deliverable(&s, NotificationKind::Info));
        assert!(!TelegramChannel::deliverable(&s, NotificationKind::Success));

        assert!(!TelegramChannel::deliverable(
            &settings(false, Some("42")),
            NotificationKind::Error
        ));
        assert!(!TelegramChannel::deliverable(
            &settings(true, None),
            NotificationKind::Error
        ));
    }

    #[test]
    fn test_format_contains_title_and_emoji() {
        let notification = Notification::new(
            "alice",
            NotificationKind::Error,
            "CO2 critical",
            "Reading 1400 ppm exceeds threshold",
        );
        let text = TelegramChannel::format(&notification);
        assert!(text.contains("<b>CO2 critical</b>"));
        assert!(text.contains("\u{274C}"));
        assert!(text.contains("GHouse Dashboard"));
    }
}
