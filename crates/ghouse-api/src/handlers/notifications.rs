//! Notification handlers.

use axum::{
    extract::{Extension, Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::{Value, json};

use ghouse_messages::NotificationKind;
use ghouse_storage::NotificationSettings;

use super::{ApiError, ServerState, require_admin};
use crate::auth::SessionInfo;
use crate::ws::Envelope;

/// Listing query.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub unread_only: bool,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// The caller's notifications, newest first.
pub async fn list_handler(
    State(state): State<ServerState>,
    Extension(user): Extension<SessionInfo>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, ApiError> {
    let notifications =
        state
            .notifications
            .list(&user.user_id, params.unread_only, params.limit)?;
    Ok(Json(json!({ "notifications": notifications })))
}

/// Unread counter.
pub async fn unread_handler(
    State(state): State<ServerState>,
    Extension(user): Extension<SessionInfo>,
) -> Result<Json<Value>, ApiError> {
    let count = state.notifications.unread_count(&user.user_id)?;
    Ok(Json(json!({ "unread": count })))
}

/// Mark selected notifications read.
#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    pub ids: Vec<String>,
}

pub async fn mark_read_handler(
    State(state): State<ServerState>,
    Extension(user): Extension<SessionInfo>,
    Json(req): Json<MarkReadRequest>,
) -> Result<Json<Value>, ApiError> {
    let updated = state.notifications.mark_read(&user.user_id, &req.ids)?;
    Ok(Json(json!({ "updated": updated })))
}

/// Mark everything read.
pub async fn mark_all_read_handler(
    State(state): State<ServerState>,
    Extension(user): Extension<SessionInfo>,
) -> Result<Json<Value>, ApiError> {
    let updated = state.notifications.mark_all_read(&user.user_id)?;
    Ok(Json(json!({ "updated": updated })))
}

/// Delete one notification.
pub async fn delete_handler(
    State(state): State<ServerState>,
    Extension(user): Extension<SessionInfo>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !state.notifications.delete(&user.user_id, &id)? {
        return Err(ApiError::NotFound(format!(
            "Notification '{}' not found",
            id
        )));
    }
    Ok(Json(json!({ "deleted": id })))
}

/// The caller's delivery settings.
pub async fn settings_handler(
    State(state): State<ServerState>,
    Extension(user): Extension<SessionInfo>,
) -> Result<Json<Value>, ApiError> {
    let settings = state.notifications.settings(&user.user_id)?;
    Ok(Json(json!({ "settings": settings })))
}

/// Update delivery settings.
#[derive(Debug, Deserialize)]
pub struct SettingsRequest {
    pub telegram_enabled: Option<bool>,
    pub telegram_chat_id: Option<String>,
    pub notify_error: Option<bool>,
    pub notify_warning: Option<bool>,
    pub notify_info: Option<bool>,
}

pub async fn update_settings_handler(
    State(state): State<ServerState>,
    Extension(user): Extension<SessionInfo>,
    Json(req): Json<SettingsRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut settings = state.notifications.settings(&user.user_id)?;
    apply_settings(&mut settings, req);
    state.notifications.put_settings(&settings)?;
    Ok(Json(json!({ "settings": settings })))
}

fn apply_settings(settings: &mut NotificationSettings, req: SettingsRequest) {
    if let Some(enabled) = req.telegram_enabled {
        settings.telegram_enabled = enabled;
    }
    if let Some(chat_id) = req.telegram_chat_id {
        settings.telegram_chat_id = if chat_id.is_empty() {
            None
        } else {
            Some(chat_id)
        };
    }
    if let Some(v) = req.notify_error {
        settings.notify_error = v;
    }
    if let Some(v) = req.notify_warning {
        settings.notify_warning = v;
    }
    if let Some(v) = req.notify_info {
        settings.notify_info = v;
    }
}

/// Send a notification to a user (admin only). Persists, runs the delivery
/// channels and pushes a `notification` envelope to the target's open
/// connections.
#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub user_id: String,
    #[serde(default)]
    pub kind: Option<String>,
    pub title: String,
    pub message: String,
}

pub async fn send_handler(
    State(state): State<ServerState>,
    Extension(admin): Extension<SessionInfo>,
    Json(req): Json<SendRequest>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&admin)?;

    let kind = match req.kind.as_deref() {
        None => NotificationKind::Info,
        Some(name) => NotificationKind::from_string(name)
            .ok_or_else(|| ApiError::BadRequest(format!("Unknown kind '{}'", name)))?,
    };

    let notification = state
        .notifications
        .notify(&req.user_id, kind, &req.title, &req.message, Some("admin"))
        .await?;

    state.registry.send_to_user(
        &req.user_id,
        Envelope::notification(serde_json::to_value(&notification).unwrap_or_default()),
    );

    Ok(Json(json!({ "notification": notification })))
}
