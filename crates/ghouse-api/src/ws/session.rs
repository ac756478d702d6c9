//! Per-connection WebSocket session protocol.
//!
//! Connect with `ws://host/ws?token=<access_token>`. The token is validated
//! before the connection is registered; handshake failures close with a
//! distinct code and never touch the registry. While open, inbound frames
//! are processed in arrival order by this loop; outbound delivery runs
//! through a writer task draining the connection's queue, so broadcasts
//! never block on a slow peer inside the registry.

use std::borrow::Cow;

use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{CloseFrame, Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::server::ServerState;

use super::envelope::{ClientRequest, Envelope, close_codes};
use super::registry::{ConnectionId, ConnectionRegistry};

/// Query parameters for the WebSocket route.
#[derive(Debug, Deserialize)]
pub struct WsParams {
    #[serde(default)]
    pub token: Option<String>,
}

/// WebSocket endpoint for real-time updates.
pub async fn ws_handler(
    State(state): State<ServerState>,
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params.token))
}

async fn close_with(mut socket: WebSocket, code: u16, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: Cow::Borrowed(reason),
        })))
        .await;
}

async fn handle_socket(socket: WebSocket, state: ServerState, token: Option<String>) {
    // Handshake: no registry side effects until the credential is good.
    let user_id = match token {
        None => {
            return close_with(socket, close_codes::TOKEN_REQUIRED, "Token required").await;
        }
        Some(token) => match state.auth.validate_token(&token) {
            Err(_) => {
                return close_with(socket, close_codes::TOKEN_INVALID, "Invalid token").await;
            }
            Ok(session) if session.user_id.is_empty() => {
                return close_with(socket, close_codes::TOKEN_NO_USER, "Invalid token payload")
                    .await;
            }
            Ok(session) => session.user_id,
        },
    };

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    // Writer task: the only owner of the sink. Ends when every sender is
    // dropped, which happens on unregister.
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    let registry = state.registry.clone();
    let id = registry.register(&user_id, tx.clone());

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => dispatch(&registry, id, &text),
            Ok(Message::Close(_)) | Err(_) => break,
            // Binary frames and transport pings are ignored; axum answers
            // protocol pings itself.
            Ok(_) => {}
        }
    }

    registry.unregister(id);
    drop(tx);
    let _ = writer.await;
    debug!(user_id = %user_id, "WebSocket session ended");
}

/// Dispatch one inbound text frame. Malformed data and unknown kinds get
/// an `error` envelope; the connection stays open either way.
fn dispatch(registry: &ConnectionRegistry, id: ConnectionId, text: &str) {
    match ClientRequest::parse(text) {
        Ok(ClientRequest::Subscribe { channel }) => {
            registry.subscribe(id, &channel);
            registry.send_to_connection(id, Envelope::subscribed(channel));
        }
        Ok(ClientRequest::Unsubscribe { channel }) => {
            registry.unsubscribe(id, &channel);
            registry.send_to_connection(id, Envelope::unsubscribed(channel));
        }
        Ok(ClientRequest::Ping) => {
            registry.send_to_connection(id, Envelope::pong());
        }
        Ok(ClientRequest::GetStats) => {
            let payload = serde_json::to_value(registry.stats()).unwrap_or_default();
            registry.send_to_connection(id, Envelope::stats(payload));
        }
        Err(e) => {
            registry.send_to_connection(id, Envelope::error(e.message()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn connect(registry: &ConnectionRegistry) -> (ConnectionId, UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (registry.register("alice", tx), rx)
    }

    fn next_frame(rx: &mut UnboundedReceiver<Message>) -> serde_json::Value {
        match rx.try_recv().expect("expected a frame") {
            Message::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_subscribe_flow() {
        let registry = ConnectionRegistry::new();
        let (id, mut rx) = connect(&registry);

        dispatch(&registry, id, r#"{"type":"subscribe","channel":"air"}"#);
        let reply = next_frame(&mut rx);
        assert_eq!(reply["type"], "subscribed");
        assert_eq!(reply["channel"], "air");
        assert_eq!(registry.stats().channels.get("air"), Some(&1));

        dispatch(&registry, id, r#"{"type":"unsubscribe","channel":"air"}"#);
        let reply = next_frame(&mut rx);
        assert_eq!(reply["type"], "unsubscribed");
        assert!(registry.stats().channels.is_empty());
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let registry = ConnectionRegistry::new();
        let (id, mut rx) = connect(&registry);

        dispatch(&registry, id, r#"{"type":"ping"}"#);
        let reply = next_frame(&mut rx);
        assert_eq!(reply["type"], "pong");
        assert!(reply.get("payload").is_none());
        assert!(reply["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_get_stats() {
        let registry = ConnectionRegistry::new();
        let (id, mut rx) = connect(&registry);
        registry.subscribe(id, "soil");

        dispatch(&registry, id, r#"{"type":"get_stats"}"#);
        let reply = next_frame(&mut rx);
        assert_eq!(reply["type"], "stats");
        assert_eq!(reply["payload"]["total_connections"], 1);
        assert_eq!(reply["payload"]["channels"]["soil"], 1);
    }

    #[tokio::test]
    async fn test_unknown_kind_keeps_connection_open() {
        let registry = ConnectionRegistry::new();
        let (id, mut rx) = connect(&registry);

        dispatch(&registry, id, r#"{"type":"launch_missiles"}"#);
        let reply = next_frame(&mut rx);
        assert_eq!(reply["type"], "error");
        assert!(
            reply["message"]
                .as_str()
                .unwrap()
                .contains("launch_missiles")
        );
        assert_eq!(registry.stats().total_connections, 1);
    }

    #[tokio::test]
    async fn test_malformed_frame_keeps_connection_open() {
        let registry = ConnectionRegistry::new();
        let (id, mut rx) = connect(&registry);

        dispatch(&registry, id, "{{ not json");
        let reply = next_frame(&mut rx);
        assert_eq!(reply["type"], "error");
        assert_eq!(reply["message"], "Invalid JSON");
        assert_eq!(registry.stats().total_connections, 1);
    }
}
