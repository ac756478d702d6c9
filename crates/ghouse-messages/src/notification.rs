//! Notification types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ghouse_storage::StoredNotification;

/// Unique notification identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub Uuid);

impl NotificationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for NotificationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Notification kinds, in the dashboard's palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    #[default]
    Info,
    Warning,
    Error,
    Success,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Success => "success",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "info" => Some(Self::Info),
            "warning" | "warn" => Some(Self::Warning),
            "error" => Some(Self::Error),
            "success" => Some(Self::Success),
            _ => None,
        }
    }

    /// Emoji prefix used by the Telegram channel.
    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Info => "\u{2139}\u{FE0F}",
            Self::Warning => "\u{26A0}\u{FE0F}",
            Self::Error => "\u{274C}",
            Self::Success => "\u{2705}",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user-directed notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    /// Owning user.
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    /// Subsystem that produced the notification (e.g. "air", "drones").
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: impl Into<String>,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            user_id: user_id.into(),
            kind,
            title: title.into(),
            message: message.into(),
            is_read: false,
            source: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Convert to the persisted shape.
    pub fn to_stored(&self) -> StoredNotification {
        StoredNotification {
            id: self.id.to_string(),
            user_id: self.user_id.clone(),
            kind: self.kind.as_str().to_string(),
            title: self.title.clone(),
            message: self.message.clone(),
            is_read: self.is_read,
            source: self.source.clone(),
            created_at: self.created_at.timestamp(),
        }
    }

    /// Convert from the persisted shape.
    pub fn from_stored(stored: StoredNotification) -> Self {
        Self {
            id: NotificationId::from_string(&stored.id).unwrap_or_default(),
            user_id: stored.user_id,
            kind: NotificationKind::from_string(&stored.kind).unwrap_or_default(),
            title: stored.title,
            message: stored.message,
            is_read: stored.is_read,
            source: stored.source,
            created_at: DateTime::from_timestamp(stored.created_at, 0).unwrap_or_else(Utc::now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!(NotificationKind::from_string("warn"), Some(NotificationKind::Warning));
        assert_eq!(NotificationKind::from_string("SUCCESS"), Some(NotificationKind::Success));
        assert_eq!(NotificationKind::from_string("bogus"), None);
    }

    #[test]
    fn test_stored_roundtrip() {
        let original = Notification::new("alice", NotificationKind::Error, "CO2 high", "1200 ppm")
            .with_source("air");
        let restored = Notification::from_stored(original.to_stored());

        assert_eq!(restored.id, original.id);
        assert_eq!(restored.kind, NotificationKind::Error);
        assert_eq!(restored.source.as_deref(), Some("air"));
        assert_eq!(restored.created_at.timestamp(), original.created_at.timestamp());
    }
}
