//! Wire envelopes exchanged with dashboard clients.
//!
//! Inbound: `{ "type": "subscribe"|"unsubscribe"|"ping"|"get_stats",
//! "channel"?: "...", "payload"?: {...} }`. Outbound envelopes always carry
//! a server-assigned timestamp; timestamps on inbound data are never
//! trusted.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// WebSocket close codes used during the handshake.
pub mod close_codes {
    /// No token supplied.
    pub const TOKEN_REQUIRED: u16 = 4001;
    /// Token failed validation.
    pub const TOKEN_INVALID: u16 = 4002;
    /// Token validated but carries no user id.
    pub const TOKEN_NO_USER: u16 = 4003;
}

/// Channel used for user-directed notification envelopes.
pub const NOTIFICATIONS_CHANNEL: &str = "notifications";
/// Channel used for command responses and system messages.
pub const SYSTEM_CHANNEL: &str = "system";

/// Outbound message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    Subscribed,
    Unsubscribed,
    Pong,
    Stats,
    TelemetryUpdate,
    Alert,
    Notification,
    CommandResponse,
    Error,
}

/// An outbound envelope.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Human-readable detail, used by `error` envelopes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Envelope {
    fn new(kind: EnvelopeKind) -> Self {
        Self {
            kind,
            channel: None,
            timestamp: Utc::now(),
            payload: None,
            message: None,
        }
    }

    pub fn subscribed(channel: impl Into<String>) -> Self {
        Self {
            channel: Some(channel.into()),
            ..Self::new(EnvelopeKind::Subscribed)
        }
    }

    pub fn unsubscribed(channel: impl Into<String>) -> Self {
        Self {
            channel: Some(channel.into()),
            ..Self::new(EnvelopeKind::Unsubscribed)
        }
    }

    pub fn pong() -> Self {
        Self::new(EnvelopeKind::Pong)
    }

    pub fn stats(payload: Value) -> Self {
        Self {
            payload: Some(payload),
            ..Self::new(EnvelopeKind::Stats)
        }
    }

    pub fn telemetry_update(channel: impl Into<String>, payload: Value) -> Self {
        Self {
            channel: Some(channel.into()),
            payload: Some(payload),
            ..Self::new(EnvelopeKind::TelemetryUpdate)
        }
    }

    pub fn alert(channel: impl Into<String>, payload: Value) -> Self {
        Self {
            channel: Some(channel.into()),
            payload: Some(payload),
            ..Self::new(EnvelopeKind::Alert)
        }
    }

    pub fn notification(payload: Value) -> Self {
        Self {
            channel: Some(NOTIFICATIONS_CHANNEL.to_string()),
            payload: Some(payload),
            ..Self::new(EnvelopeKind::Notification)
        }
    }

    pub fn command_response(command: &str, status: &str, data: Value) -> Self {
        Self {
            channel: Some(SYSTEM_CHANNEL.to_string()),
            payload: Some(serde_json::json!({
                "command": command,
                "status": status,
                "data": data,
            })),
            ..Self::new(EnvelopeKind::CommandResponse)
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(EnvelopeKind::Error)
        }
    }

    /// Serialize for the wire. Envelopes are plain data; serialization
    /// cannot realistically fail, but a failure must never take down a
    /// connection loop.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","message":"internal serialization error"}"#.to_string()
        })
    }
}

/// Why an inbound frame could not be dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// Not valid JSON, or not an object with a string `type`.
    Malformed,
    /// Recognized shape, unsupported kind.
    UnknownKind(String),
    /// Kind requires a channel but none was given.
    MissingChannel(&'static str),
}

impl RequestError {
    /// The `error` envelope text for this failure.
    pub fn message(&self) -> String {
        match self {
            RequestError::Malformed => "Invalid JSON".to_string(),
            RequestError::UnknownKind(kind) => format!("Unknown message type: {}", kind),
            RequestError::MissingChannel(kind) => format!("{} requires a channel", kind),
        }
    }
}

/// A decoded inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
    Subscribe { channel: String },
    Unsubscribe { channel: String },
    Ping,
    GetStats,
}

impl ClientRequest {
    /// Parse one inbound text frame.
    pub fn parse(text: &str) -> Result<Self, RequestError> {
        let value: Value = serde_json::from_str(text).map_err(|_| RequestError::Malformed)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(RequestError::Malformed)?;
        let channel = value
            .get("channel")
            .and_then(Value::as_str)
            .map(str::to_string);

        match kind {
            "subscribe" => Ok(ClientRequest::Subscribe {
                channel: channel.ok_or(RequestError::MissingChannel("subscribe"))?,
            }),
            "unsubscribe" => Ok(ClientRequest::Unsubscribe {
                channel: channel.ok_or(RequestError::MissingChannel("unsubscribe"))?,
            }),
            "ping" => Ok(ClientRequest::Ping),
            "get_stats" => Ok(ClientRequest::GetStats),
            other => Err(RequestError::UnknownKind(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_subscribe() {
        let request = ClientRequest::parse(r#"{"type":"subscribe","channel":"air"}"#).unwrap();
        assert_eq!(
            request,
            ClientRequest::Subscribe {
                channel: "air".to_string()
            }
        );
    }

    #[test]
    fn test_parse_subscribe_without_channel() {
        let err = ClientRequest::parse(r#"{"type":"subscribe"}"#).unwrap_err();
        assert_eq!(err, RequestError::MissingChannel("subscribe"));
    }

    #[test]
    fn test_parse_unknown_kind_names_it() {
        let err = ClientRequest::parse(r#"{"type":"warp"}"#).unwrap_err();
        assert_eq!(err, RequestError::UnknownKind("warp".to_string()));
        assert!(err.message().contains("warp"));
    }

    #[test]
    fn test_parse_malformed() {
        assert_eq!(
            ClientRequest::parse("not json").unwrap_err(),
            RequestError::Malformed
        );
        assert_eq!(
            ClientRequest::parse(r#"{"no_type": true}"#).unwrap_err(),
            RequestError::Malformed
        );
    }

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = Envelope::telemetry_update("drones", json!({"battery": 42.0}));
        let wire: Value = serde_json::from_str(&envelope.to_json()).unwrap();
        assert_eq!(wire["type"], "telemetry_update");
        assert_eq!(wire["channel"], "drones");
        assert_eq!(wire["payload"]["battery"], 42.0);
        // RFC 3339 timestamp
        assert!(wire["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_pong_has_fresh_timestamp_and_no_payload() {
        let before = Utc::now();
        let pong = Envelope::pong();
        assert!(pong.timestamp >= before);

        let wire: Value = serde_json::from_str(&pong.to_json()).unwrap();
        assert_eq!(wire["type"], "pong");
        assert!(wire.get("payload").is_none());
        assert!(wire.get("channel").is_none());
    }

    #[test]
    fn test_command_response_shape() {
        let envelope = Envelope::command_response("takeoff", "success", json!({"drone_id": 7}));
        let wire: Value = serde_json::from_str(&envelope.to_json()).unwrap();
        assert_eq!(wire["type"], "command_response");
        assert_eq!(wire["channel"], "system");
        assert_eq!(wire["payload"]["command"], "takeoff");
        assert_eq!(wire["payload"]["data"]["drone_id"], 7);
    }
}
