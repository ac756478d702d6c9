//! Notification system for the GHouse backend.
//!
//! Notifications are user-directed messages about facility events: threshold
//! alerts, command results, system status. They are persisted through
//! `ghouse-storage` and delivered over pluggable channels.
//!
//! - **Channels**: console (logs), memory (tests), Telegram (Bot API)
//! - **Kinds**: info, warning, error, success
//!
//! WebSocket delivery is not a channel here: the API server pushes a
//! `notification` envelope itself after the manager persists the record.

pub mod channels;
pub mod error;
pub mod manager;
pub mod notification;

pub use channels::{
    ChannelRegistry, ConsoleChannel, MemoryChannel, NotificationChannel, TelegramChannel,
};
pub use channels::telegram::BroadcastReport;
pub use error::{Error, Result};
pub use manager::NotificationManager;
pub use notification::{Notification, NotificationId, NotificationKind};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
