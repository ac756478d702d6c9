//! WebSocket layer: wire envelopes, the connection registry and the
//! per-connection session protocol.

pub mod envelope;
pub mod registry;
pub mod session;

pub use envelope::{ClientRequest, Envelope, EnvelopeKind, RequestError, close_codes};
pub use registry::{ConnectionId, ConnectionRegistry, RegistryStats};
pub use session::ws_handler;
