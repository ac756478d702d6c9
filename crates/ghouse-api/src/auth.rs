//! User authentication.
//!
//! Username/password accounts persisted in redb, bcrypt password hashes,
//! HS256 JWT session tokens and role-based access control. The same token
//! validator backs the REST middleware and the WebSocket handshake.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::prelude::*;
use hmac::{Hmac, Mac};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use tokio::sync::RwLock;
use tracing::{error, info};

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};

use ghouse_core::config::AuthSettings;

type HmacSha256 = Hmac<Sha256>;

const USERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

fn create_hmac(key: &[u8]) -> Result<HmacSha256, AuthError> {
    HmacSha256::new_from_slice(key)
        .map_err(|_| AuthError::InvalidInput("Invalid JWT secret length".to_string()))
}

/// User roles for RBAC.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Full access, including user management.
    Admin,
    /// Can operate the facility: commands, settings, notifications.
    User,
    /// Read-only dashboard access.
    Viewer,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::User => "user",
            UserRole::Viewer => "viewer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(UserRole::Admin),
            "user" => Some(UserRole::User),
            "viewer" => Some(UserRole::Viewer),
            _ => None,
        }
    }
}

/// User account record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub role: UserRole,
    pub created_at: i64,
    pub last_login: Option<i64>,
    pub active: bool,
}

/// Validated session extracted from a JWT.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub user_id: String,
    pub username: String,
    pub role: UserRole,
    pub created_at: i64,
    pub expires_at: i64,
}

/// Login request.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Login response.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserInfo,
}

/// User information (without the password hash).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub role: UserRole,
    pub created_at: i64,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            role: user.role.clone(),
            created_at: user.created_at,
        }
    }
}

/// Register request.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<UserRole>,
}

/// Change password request.
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// Authentication state: user accounts plus the JWT signer.
#[derive(Clone)]
pub struct AuthState {
    users: Arc<RwLock<HashMap<String, User>>>,
    db_path: PathBuf,
    jwt_secret: String,
    session_duration: i64,
}

impl AuthState {
    /// Open the user database under the given data directory.
    pub fn open(data_dir: &Path, settings: &AuthSettings) -> Self {
        let db_path = data_dir.join("users.redb");
        let jwt_secret = settings.jwt_secret.clone().unwrap_or_else(|| {
            // Random secret: every restart invalidates outstanding tokens.
            info!("No JWT secret configured, generating an ephemeral one");
            uuid::Uuid::new_v4().to_string().replace('-', "")
        });

        let users = Self::load_users_from_db(&db_path).unwrap_or_default();
        if users.is_empty() {
            info!("No users found; register an admin account to get started");
        } else {
            info!(count = users.len(), "Loaded user accounts");
        }

        Self {
            users: Arc::new(RwLock::new(users)),
            db_path,
            jwt_secret,
            session_duration: settings.jwt_expire_secs,
        }
    }

    fn load_users_from_db(path: &Path) -> Result<HashMap<String, User>, AuthError> {
        if !path.exists() {
            return Ok(HashMap::new());
        }

        let db = Database::open(path)
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?;
        let txn = db
            .begin_read()
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        let mut users = HashMap::new();
        if let Ok(table) = txn.open_table(USERS_TABLE) {
            let iter = table
                .iter()
                .map_err(|e| AuthError::DatabaseError(e.to_string()))?;
            for item in iter {
                let (username, value) =
                    item.map_err(|e| AuthError::DatabaseError(e.to_string()))?;
                let user = bincode::deserialize::<User>(value.value())
                    .map_err(|e| AuthError::DatabaseError(e.to_string()))?;
                users.insert(username.value().to_string(), user);
            }
        }
        Ok(users)
    }

    fn save_user_to_db(path: &Path, user: &User) -> Result<(), AuthError> {
        let user_bytes =
            bincode::serialize(user).map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AuthError::DatabaseError(e.to_string()))?;
        }
        let db = if path.exists() {
            Database::open(path)
        } else {
            Database::create(path)
        }
        .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        let txn = db
            .begin_write()
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?;
        {
            let mut table = txn
                .open_table(USERS_TABLE)
                .map_err(|e| AuthError::DatabaseError(e.to_string()))?;
            table
                .insert(user.username.as_str(), user_bytes.as_slice())
                .map_err(|e| AuthError::DatabaseError(e.to_string()))?;
        }
        txn.commit()
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    fn remove_user_from_db(path: &Path, username: &str) -> Result<(), AuthError> {
        if !path.exists() {
            return Ok(());
        }
        let db = Database::open(path)
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?;
        let txn = db
            .begin_write()
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?;
        {
            let mut table = txn
                .open_table(USERS_TABLE)
                .map_err(|e| AuthError::DatabaseError(e.to_string()))?;
            table
                .remove(username)
                .map_err(|e| AuthError::DatabaseError(e.to_string()))?;
        }
        txn.commit()
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    fn hash_password(password: &str) -> Result<String, AuthError> {
        bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(|e| {
            error!("Failed to hash password: {}", e);
            AuthError::DatabaseError("Password hashing failed".to_string())
        })
    }

    fn verify_password(password: &str, hash: &str) -> bool {
        bcrypt::verify(password, hash).unwrap_or(false)
    }

    /// Generate a signed JWT for a user.
    fn generate_token(&self, user: &User) -> Result<String, AuthError> {
        let now = chrono::Utc::now().timestamp();
        let expires_at = now + self.session_duration;

        let header =
            BASE64_URL_SAFE_NO_PAD.encode(json!({"alg": "HS256", "typ": "JWT"}).to_string());
        let payload = BASE64_URL_SAFE_NO_PAD.encode(
            json!({
                "sub": user.id,
                "username": user.username,
                "role": user.role.as_str(),
                "iat": now,
                "exp": expires_at,
            })
            .to_string(),
        );
        let signature = {
            let data = format!("{}.{}", header, payload);
            let mut mac = create_hmac(self.jwt_secret.as_bytes())?;
            mac.update(data.as_bytes());
            BASE64_URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
        };

        Ok(format!("{}.{}.{}", header, payload, signature))
    }

    /// Validate a JWT and return the session it encodes.
    ///
    /// A structurally valid, correctly signed token whose payload carries
    /// no `sub` yields a session with an empty `user_id`; the WebSocket
    /// handshake maps that to its own close code.
    pub fn validate_token(&self, token: &str) -> Result<SessionInfo, AuthError> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(AuthError::InvalidToken("Invalid token format".into()));
        }

        let data = format!("{}.{}", parts[0], parts[1]);
        let mut mac = create_hmac(self.jwt_secret.as_bytes())?;
        mac.update(data.as_bytes());

        let expected_sig = BASE64_URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        if parts[2] != expected_sig {
            return Err(AuthError::InvalidToken("Invalid signature".into()));
        }

        let payload_bytes = BASE64_URL_SAFE_NO_PAD
            .decode(parts[1])
            .map_err(|_| AuthError::InvalidToken("Invalid payload encoding".into()))?;
        let payload: serde_json::Value = serde_json::from_slice(&payload_bytes)
            .map_err(|_| AuthError::InvalidToken("Invalid payload JSON".into()))?;

        let exp = payload["exp"].as_i64().unwrap_or(0);
        if exp < chrono::Utc::now().timestamp() {
            return Err(AuthError::ExpiredToken);
        }

        Ok(SessionInfo {
            user_id: payload["sub"].as_str().unwrap_or("").to_string(),
            username: payload["username"].as_str().unwrap_or("").to_string(),
            role: UserRole::parse(payload["role"].as_str().unwrap_or("user"))
                .unwrap_or(UserRole::User),
            created_at: payload["iat"].as_i64().unwrap_or(0),
            expires_at: exp,
        })
    }

    /// Register a new user.
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        role: UserRole,
    ) -> Result<(UserInfo, String), AuthError> {
        if username.len() < 3 {
            return Err(AuthError::InvalidInput(
                "Username must be at least 3 characters".into(),
            ));
        }
        if password.len() < 6 {
            return Err(AuthError::InvalidInput(
                "Password must be at least 6 characters".into(),
            ));
        }

        {
            let users = self.users.read().await;
            if users.contains_key(username) {
                return Err(AuthError::UserExists);
            }
        }

        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
            password_hash: Self::hash_password(password)?,
            role: role.clone(),
            created_at: chrono::Utc::now().timestamp(),
            last_login: None,
            active: true,
        };

        Self::save_user_to_db(&self.db_path, &user)?;

        let token = self.generate_token(&user)?;
        let info = UserInfo::from(&user);

        self.users
            .write()
            .await
            .insert(username.to_string(), user);

        info!(username = username, role = role.as_str(), "User registered");
        Ok((info, token))
    }

    /// Verify credentials and issue a token.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, AuthError> {
        let token;
        let info;
        {
            let mut users = self.users.write().await;
            let user = users.get_mut(username).ok_or(AuthError::InvalidCredentials)?;

            if !user.active {
                return Err(AuthError::UserDisabled);
            }
            if !Self::verify_password(password, &user.password_hash) {
                return Err(AuthError::InvalidCredentials);
            }

            user.last_login = Some(chrono::Utc::now().timestamp());
            token = self.generate_token(user)?;
            info = UserInfo::from(&*user);
        }

        info!(username = username, "User logged in");
        Ok(LoginResponse { token, user: info })
    }

    /// Change a user's password after verifying the old one.
    pub async fn change_password(
        &self,
        username: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        if new_password.len() < 6 {
            return Err(AuthError::InvalidInput(
                "Password must be at least 6 characters".into(),
            ));
        }

        let mut users = self.users.write().await;
        let user = users.get_mut(username).ok_or(AuthError::UserNotFound)?;

        if !Self::verify_password(old_password, &user.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }

        user.password_hash = Self::hash_password(new_password)?;
        Self::save_user_to_db(&self.db_path, user)?;

        info!(username = username, "Password changed");
        Ok(())
    }

    /// List all user accounts.
    pub async fn list_users(&self) -> Vec<UserInfo> {
        let users = self.users.read().await;
        users.values().map(UserInfo::from).collect()
    }

    /// User ids of all active admins (alert notification targets).
    pub async fn admin_ids(&self) -> Vec<String> {
        let users = self.users.read().await;
        users
            .values()
            .filter(|u| u.active && u.role == UserRole::Admin)
            .map(|u| u.id.clone())
            .collect()
    }

    /// Delete a user account.
    pub async fn delete_user(&self, username: &str) -> Result<(), AuthError> {
        let mut users = self.users.write().await;
        users.remove(username).ok_or(AuthError::UserNotFound)?;
        Self::remove_user_from_db(&self.db_path, username)?;
        Ok(())
    }
}

/// Authentication errors.
#[derive(Debug, Clone)]
pub enum AuthError {
    InvalidCredentials,
    UserExists,
    UserNotFound,
    UserDisabled,
    InvalidToken(String),
    ExpiredToken,
    InvalidInput(String),
    Forbidden(String),
    DatabaseError(String),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::InvalidCredentials => write!(f, "Invalid username or password"),
            AuthError::UserExists => write!(f, "User already exists"),
            AuthError::UserNotFound => write!(f, "User not found"),
            AuthError::UserDisabled => write!(f, "User account is disabled"),
            AuthError::InvalidToken(msg) => write!(f, "Invalid token: {}", msg),
            AuthError::ExpiredToken => write!(f, "Token has expired"),
            AuthError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            AuthError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AuthError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message): (StatusCode, String) = match self {
            AuthError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "Invalid username or password".into(),
            ),
            AuthError::UserExists => (StatusCode::CONFLICT, "User already exists".into()),
            AuthError::UserNotFound => (StatusCode::NOT_FOUND, "User not found".into()),
            AuthError::UserDisabled => {
                (StatusCode::FORBIDDEN, "User account is disabled".into())
            }
            AuthError::InvalidToken(msg) => (StatusCode::UNAUTHORIZED, msg),
            AuthError::ExpiredToken => (StatusCode::UNAUTHORIZED, "Token has expired".into()),
            AuthError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AuthError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AuthError::DatabaseError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}

/// JWT authentication middleware. Validates the `Authorization: Bearer`
/// header and stores the session in request extensions.
pub async fn jwt_auth_middleware(
    State(state): State<crate::server::ServerState>,
    headers: HeaderMap,
    mut req: axum::extract::Request,
    next: Next,
) -> Result<Response, AuthError> {
    let auth_header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AuthError::InvalidToken("Missing Authorization header".into()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AuthError::InvalidToken("Invalid Authorization format".into()))?;

    let session_info = state.auth.validate_token(token)?;
    req.extensions_mut().insert(session_info);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> (tempfile::TempDir, AuthState) {
        let dir = tempfile::tempdir().unwrap();
        let settings = AuthSettings {
            jwt_secret: Some("test-secret".to_string()),
            jwt_expire_secs: 3600,
        };
        let state = AuthState::open(dir.path(), &settings);
        (dir, state)
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let (_dir, auth) = auth();
        let (user, token) = auth
            .register("testuser", "password123", UserRole::User)
            .await
            .unwrap();
        assert_eq!(user.username, "testuser");
        assert!(!token.is_empty());

        let response = auth.login("testuser", "password123").await.unwrap();
        assert_eq!(response.user.username, "testuser");
        assert!(auth.login("testuser", "wrong").await.is_err());
    }

    #[tokio::test]
    async fn test_token_validation_roundtrip() {
        let (_dir, auth) = auth();
        let (user, token) = auth
            .register("testuser", "password123", UserRole::Admin)
            .await
            .unwrap();

        let session = auth.validate_token(&token).unwrap();
        assert_eq!(session.username, "testuser");
        assert_eq!(session.user_id, user.id);
        assert_eq!(session.role, UserRole::Admin);
        assert!(session.expires_at > chrono::Utc::now().timestamp());
    }

    #[tokio::test]
    async fn test_tampered_token_rejected() {
        let (_dir, auth) = auth();
        let (_, token) = auth
            .register("testuser", "password123", UserRole::User)
            .await
            .unwrap();

        let mut tampered = token.clone();
        tampered.push('x');
        assert!(auth.validate_token(&tampered).is_err());
        assert!(auth.validate_token("garbage").is_err());
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let settings = AuthSettings {
            jwt_secret: Some("test-secret".to_string()),
            jwt_expire_secs: -10,
        };
        let auth = AuthState::open(dir.path(), &settings);
        let (_, token) = auth
            .register("testuser", "password123", UserRole::User)
            .await
            .unwrap();

        assert!(matches!(
            auth.validate_token(&token),
            Err(AuthError::ExpiredToken)
        ));
    }

    #[tokio::test]
    async fn test_change_password() {
        let (_dir, auth) = auth();
        auth.register("testuser", "password123", UserRole::User)
            .await
            .unwrap();

        auth.change_password("testuser", "password123", "newpassword")
            .await
            .unwrap();
        assert!(auth.login("testuser", "password123").await.is_err());
        auth.login("testuser", "newpassword").await.unwrap();
    }

    #[tokio::test]
    async fn test_admin_ids() {
        let (_dir, auth) = auth();
        auth.register("admin1", "password123", UserRole::Admin)
            .await
            .unwrap();
        auth.register("plain", "password123", UserRole::User)
            .await
            .unwrap();

        assert_eq!(auth.admin_ids().await.len(), 1);
    }

    #[tokio::test]
    async fn test_persistence_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let settings = AuthSettings {
            jwt_secret: Some("test-secret".to_string()),
            jwt_expire_secs: 3600,
        };
        {
            let auth = AuthState::open(dir.path(), &settings);
            auth.register("testuser", "password123", UserRole::User)
                .await
                .unwrap();
        }

        let reopened = AuthState::open(dir.path(), &settings);
        reopened.login("testuser", "password123").await.unwrap();
    }
}
