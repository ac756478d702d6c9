//! User authentication API handlers.

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::Json,
};

use crate::auth::{
    AuthError, ChangePasswordRequest, LoginRequest, LoginResponse, RegisterRequest, SessionInfo,
    UserRole,
};
use crate::server::ServerState;

/// Login handler: authenticate and return a JWT.
pub async fn login_handler(
    State(state): State<ServerState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AuthError> {
    let response = state.auth.login(&req.username, &req.password).await?;
    Ok(Json(response))
}

/// Register handler: create a new account. The first account should be an
/// admin; role defaults to `user`.
pub async fn register_handler(
    State(state): State<ServerState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AuthError> {
    let role = req.role.unwrap_or(UserRole::User);
    let (user, token) = state
        .auth
        .register(&req.username, &req.password, role)
        .await?;
    let response = serde_json::json!({
        "token": token,
        "user": user,
    });
    Ok((StatusCode::CREATED, Json(response)))
}

/// Logout handler. Tokens are stateless; logout is an acknowledgement.
pub async fn logout_handler(
    Extension(user): Extension<SessionInfo>,
) -> Result<Json<serde_json::Value>, AuthError> {
    tracing::info!(username = %user.username, "User logged out");
    Ok(Json(
        serde_json::json!({"message": "Logged out successfully"}),
    ))
}

/// Current user info.
pub async fn get_current_user_handler(
    Extension(user): Extension<SessionInfo>,
) -> Result<Json<serde_json::Value>, AuthError> {
    Ok(Json(serde_json::json!({
        "id": user.user_id,
        "username": user.username,
        "role": user.role.as_str(),
        "created_at": user.created_at,
    })))
}

/// Change password.
pub async fn change_password_handler(
    State(state): State<ServerState>,
    Extension(user): Extension<SessionInfo>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<serde_json::Value>, AuthError> {
    state
        .auth
        .change_password(&user.username, &req.old_password, &req.new_password)
        .await?;
    Ok(Json(
        serde_json::json!({"message": "Password changed successfully"}),
    ))
}

/// List all users (admin only).
pub async fn list_users_handler(
    State(state): State<ServerState>,
    Extension(user): Extension<SessionInfo>,
) -> Result<Json<serde_json::Value>, AuthError> {
    if user.role != UserRole::Admin {
        return Err(AuthError::Forbidden("Admin access required".into()));
    }
    let users = state.auth.list_users().await;
    Ok(Json(serde_json::json!({"users": users})))
}

/// Create a user (admin only).
pub async fn create_user_handler(
    State(state): State<ServerState>,
    Extension(admin): Extension<SessionInfo>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AuthError> {
    if admin.role != UserRole::Admin {
        return Err(AuthError::Forbidden("Admin access required".into()));
    }

    let role = req.role.unwrap_or(UserRole::User);
    let role_str = role.as_str();
    let (user, _token) = state
        .auth
        .register(&req.username, &req.password, role)
        .await?;

    tracing::info!(
        admin = %admin.username,
        new_user = %user.username,
        role = role_str,
        "Admin created new user"
    );
    Ok((StatusCode::CREATED, Json(serde_json::json!({"user": user}))))
}

/// Delete a user (admin only; self-deletion refused).
pub async fn delete_user_handler(
    State(state): State<ServerState>,
    Extension(admin): Extension<SessionInfo>,
    Path(username): Path<String>,
) -> Result<Json<serde_json::Value>, AuthError> {
    if admin.role != UserRole::Admin {
        return Err(AuthError::Forbidden("Admin access required".into()));
    }
    if username == admin.username {
        return Err(AuthError::InvalidInput(
            "Cannot delete your own account".into(),
        ));
    }

    state.auth.delete_user(&username).await?;

    tracing::info!(admin = %admin.username, deleted_user = %username, "Admin deleted user");
    Ok(Json(serde_json::json!({
        "message": format!("User '{}' deleted successfully", username)
    })))
}
