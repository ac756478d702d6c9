//! Error types for the notification system.

use thiserror::Error;

/// Result type for notification operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the notification system.
#[derive(Debug, Error)]
pub enum Error {
    /// Notification or channel not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Channel is disabled.
    #[error("Channel disabled: {0}")]
    ChannelDisabled(String),

    /// Send operation failed.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Storage operation failed.
    #[error("Storage failed: {0}")]
    Storage(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Other error.
    #[error("Other: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<ghouse_storage::Error> for Error {
    fn from(e: ghouse_storage::Error) -> Self {
        Error::Storage(e.to_string())
    }
}
