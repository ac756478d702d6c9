//! Telegram integration handlers.

use axum::{
    extract::{Extension, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use ghouse_messages::TelegramChannel;

use super::{ApiError, ServerState, require_admin};
use crate::auth::SessionInfo;

fn channel(state: &ServerState) -> Result<&TelegramChannel, ApiError> {
    state
        .telegram
        .as_deref()
        .ok_or_else(|| ApiError::ServiceUnavailable("Telegram bot is not configured".to_string()))
}

/// Bot status: configured flag plus identity from getMe.
pub async fn status_handler(State(state): State<ServerState>) -> Result<Json<Value>, ApiError> {
    let Some(telegram) = state.telegram.as_deref() else {
        return Ok(Json(json!({ "configured": false })));
    };

    match telegram.get_me().await {
        Ok(me) => Ok(Json(json!({ "configured": true, "bot": me }))),
        Err(e) => Ok(Json(json!({
            "configured": true,
            "reachable": false,
            "error": e.to_string(),
        }))),
    }
}

/// Send a plain message to one chat (admin only).
#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub chat_id: String,
    pub text: String,
}

pub async fn send_handler(
    State(state): State<ServerState>,
    Extension(admin): Extension<SessionInfo>,
    Json(req): Json<SendRequest>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&admin)?;
    channel(&state)?.send_text(&req.chat_id, &req.text).await?;
    Ok(Json(json!({ "status": "sent", "chat_id": req.chat_id })))
}

/// Broadcast a message to every subscribed chat (admin only).
#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub text: String,
}

pub async fn broadcast_handler(
    State(state): State<ServerState>,
    Extension(admin): Extension<SessionInfo>,
    Json(req): Json<BroadcastRequest>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&admin)?;
    let telegram = channel(&state)?;

    let chat_ids: Vec<String> = state
        .notifications
        .store()
        .telegram_subscribers()?
        .into_iter()
        .filter_map(|s| s.telegram_chat_id)
        .collect();

    info!(admin = %admin.username, chats = chat_ids.len(), "Telegram broadcast requested");
    let report = telegram.broadcast(&chat_ids, &req.text).await;
    Ok(Json(json!({ "report": report })))
}

/// Users with Telegram delivery enabled (admin only).
pub async fn subscribers_handler(
    State(state): State<ServerState>,
    Extension(admin): Extension<SessionInfo>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&admin)?;
    let subscribers = state.notifications.store().telegram_subscribers()?;
    Ok(Json(json!({ "subscribers": subscribers })))
}

/// Incoming bot update (public webhook). Replies to `/start` with the chat
/// id the user needs for their notification settings; everything else is
/// logged and dropped.
pub async fn webhook_handler(
    State(state): State<ServerState>,
    Json(update): Json<Value>,
) -> Json<Value> {
    let message = update.get("message");
    let chat_id = message
        .and_then(|m| m.get("chat"))
        .and_then(|c| c.get("id"))
        .map(|id| id.to_string());
    let text = message
        .and_then(|m| m.get("text"))
        .and_then(Value::as_str)
        .unwrap_or_default();

    if let (Some(chat_id), Some(telegram)) = (chat_id, state.telegram.as_deref()) {
        if text.starts_with("/start") {
            let reply = format!(
                "Welcome to GHouse. Your chat id is <code>{}</code>.\n\
                 Paste it into your dashboard notification settings to \
                 receive alerts here.",
                chat_id
            );
            if let Err(e) = telegram.send_text(&chat_id, &reply).await {
                warn!("Failed to answer /start: {}", e);
            }
        } else if !text.is_empty() {
            info!(chat_id = %chat_id, "Unhandled Telegram message");
        }
    }

    // Telegram only needs a 200.
    Json(json!({ "ok": true }))
}
