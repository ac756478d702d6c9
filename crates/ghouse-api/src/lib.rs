//! HTTP and WebSocket server for the GHouse backend.
//!
//! Provides the REST API for greenhouse controls, air quality, the drone
//! fleet, the conveyor and soil analysis, plus a WebSocket endpoint that
//! fans live telemetry out to dashboard clients.

pub mod auth;
pub mod handlers;
pub mod relay;
pub mod server;
pub mod shutdown;
pub mod ws;

pub use server::{ServerState, run};
