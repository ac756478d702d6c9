//! Core types for the GHouse backend.
//!
//! This crate defines the configuration surface and the unified error type
//! shared by the other workspace members.

pub mod config;
pub mod error;

pub use config::Settings;
pub use error::{Error, Result};

/// Re-exports commonly used types.
pub mod prelude {
    pub use crate::config::{Settings, env_vars};
    pub use crate::error::{Error, Result};
}
