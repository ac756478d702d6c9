//! REST API handlers.

pub mod air;
pub mod auth_users;
pub mod basic;
pub mod conveyor;
pub mod drones;
pub mod greenhouse;
pub mod notifications;
pub mod soil;
pub mod system;
pub mod telegram;

pub use crate::server::ServerState;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};

use crate::auth::{SessionInfo, UserRole};

/// Error type shared by the REST handlers.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Forbidden(String),
    ServiceUnavailable(String),
    Internal(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Forbidden(msg)
            | ApiError::ServiceUnavailable(msg)
            | ApiError::Internal(msg) => write!(f, "{}", msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<ghouse_storage::Error> for ApiError {
    fn from(e: ghouse_storage::Error) -> Self {
        match e {
            ghouse_storage::Error::NotFound(msg) => ApiError::NotFound(msg),
            ghouse_storage::Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<ghouse_messages::Error> for ApiError {
    fn from(e: ghouse_messages::Error) -> Self {
        match e {
            ghouse_messages::Error::NotFound(msg) => ApiError::NotFound(msg),
            ghouse_messages::Error::Validation(msg)
            | ghouse_messages::Error::InvalidConfiguration(msg) => ApiError::BadRequest(msg),
            ghouse_messages::Error::SendFailed(msg) => ApiError::ServiceUnavailable(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<ghouse_devices::BridgeError> for ApiError {
    fn from(e: ghouse_devices::BridgeError) -> Self {
        ApiError::ServiceUnavailable(e.to_string())
    }
}

/// Guard: admins only.
pub fn require_admin(session: &SessionInfo) -> Result<(), ApiError> {
    if session.role == UserRole::Admin {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Admin access required".to_string()))
    }
}

/// Guard: anyone who may operate equipment (viewers are read-only).
pub fn require_operator(session: &SessionInfo) -> Result<(), ApiError> {
    match session.role {
        UserRole::Admin | UserRole::User => Ok(()),
        UserRole::Viewer => Err(ApiError::Forbidden(
            "Viewer accounts are read-only".to_string(),
        )),
    }
}
