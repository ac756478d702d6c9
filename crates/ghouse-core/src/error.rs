//! Unified error handling for the GHouse backend.
//!
//! This module provides a common error type that can be used across all
//! crates, reducing boilerplate and making error handling consistent.

/// Unified error type for GHouse.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage/database errors.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Device/bridge-related errors.
    #[error("Device error: {0}")]
    Device(String),

    /// Notification delivery errors.
    #[error("Notification error: {0}")]
    Notification(String),

    /// Network-related errors.
    #[error("Network error: {0}")]
    Network(String),

    /// Authentication/authorization errors.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Validation errors.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for convenience.
pub type Result<T> = std::result::Result<T, Error>;

// Error conversion helpers
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Internal(e.to_string())
    }
}

impl From<uuid::Error> for Error {
    fn from(e: uuid::Error) -> Self {
        Error::Validation(e.to_string())
    }
}

// Convenience constructors for common errors
impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }
}
