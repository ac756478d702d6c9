//! Application configuration.
//!
//! All settings are read from `GHOUSE_*` environment variables with
//! defaults suitable for local development. The variable names live in
//! [`env_vars`] so the CLI, the server and the tests agree on them.

use serde::{Deserialize, Serialize};

/// Environment variable names.
pub mod env_vars {
    pub const HOST: &str = "GHOUSE_HOST";
    pub const PORT: &str = "GHOUSE_PORT";
    pub const DATA_DIR: &str = "GHOUSE_DATA_DIR";

    pub const MQTT_BROKER: &str = "GHOUSE_MQTT_BROKER";
    pub const MQTT_PORT: &str = "GHOUSE_MQTT_PORT";
    pub const MQTT_USERNAME: &str = "GHOUSE_MQTT_USERNAME";
    pub const MQTT_PASSWORD: &str = "GHOUSE_MQTT_PASSWORD";
    pub const MQTT_CLIENT_ID: &str = "GHOUSE_MQTT_CLIENT_ID";

    pub const JWT_SECRET: &str = "GHOUSE_JWT_SECRET";
    pub const JWT_EXPIRE_SECS: &str = "GHOUSE_JWT_EXPIRE_SECS";

    pub const TELEGRAM_BOT_TOKEN: &str = "GHOUSE_TELEGRAM_BOT_TOKEN";
    pub const TELEGRAM_WEBHOOK_URL: &str = "GHOUSE_TELEGRAM_WEBHOOK_URL";

    pub const LOG_JSON: &str = "GHOUSE_LOG_JSON";
}

/// Default values used when the environment does not override them.
pub mod defaults {
    pub const HOST: &str = "127.0.0.1";
    pub const PORT: u16 = 8000;
    pub const DATA_DIR: &str = "data";

    pub const MQTT_BROKER: &str = "localhost";
    pub const MQTT_PORT: u16 = 1883;
    pub const MQTT_CLIENT_ID: &str = "ghouse-backend";

    /// 7 days.
    pub const JWT_EXPIRE_SECS: i64 = 7 * 24 * 60 * 60;
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Directory for redb database files.
    pub data_dir: String,
}

/// Upstream MQTT broker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttSettings {
    pub broker: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
}

/// JWT session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// HMAC secret. When unset a random secret is generated at startup,
    /// which invalidates all tokens on restart.
    pub jwt_secret: Option<String>,
    pub jwt_expire_secs: i64,
}

/// Telegram bot settings. The bot is optional; with no token the Telegram
/// channel stays disabled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramSettings {
    pub bot_token: Option<String>,
    pub webhook_url: Option<String>,
}

impl TelegramSettings {
    pub fn is_configured(&self) -> bool {
        self.bot_token.is_some()
    }
}

/// Full application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub mqtt: MqttSettings,
    pub auth: AuthSettings,
    pub telegram: TelegramSettings,
}

impl Settings {
    /// Load settings from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            server: ServerSettings {
                host: env_or(env_vars::HOST, defaults::HOST),
                port: env_parse(env_vars::PORT, defaults::PORT),
                data_dir: env_or(env_vars::DATA_DIR, defaults::DATA_DIR),
            },
            mqtt: MqttSettings {
                broker: env_or(env_vars::MQTT_BROKER, defaults::MQTT_BROKER),
                port: env_parse(env_vars::MQTT_PORT, defaults::MQTT_PORT),
                username: env_opt(env_vars::MQTT_USERNAME),
                password: env_opt(env_vars::MQTT_PASSWORD),
                client_id: env_or(env_vars::MQTT_CLIENT_ID, defaults::MQTT_CLIENT_ID),
            },
            auth: AuthSettings {
                jwt_secret: env_opt(env_vars::JWT_SECRET),
                jwt_expire_secs: env_parse(env_vars::JWT_EXPIRE_SECS, defaults::JWT_EXPIRE_SECS),
            },
            telegram: TelegramSettings {
                bot_token: env_opt(env_vars::TELEGRAM_BOT_TOKEN),
                webhook_url: env_opt(env_vars::TELEGRAM_WEBHOOK_URL),
            },
        }
    }

    /// Socket address string for the HTTP listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: defaults::HOST.to_string(),
                port: defaults::PORT,
                data_dir: defaults::DATA_DIR.to_string(),
            },
            mqtt: MqttSettings {
                broker: defaults::MQTT_BROKER.to_string(),
                port: defaults::MQTT_PORT,
                username: None,
                password: None,
                client_id: defaults::MQTT_CLIENT_ID.to_string(),
            },
            auth: AuthSettings {
                jwt_secret: None,
                jwt_expire_secs: defaults::JWT_EXPIRE_SECS,
            },
            telegram: TelegramSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, defaults::PORT);
        assert_eq!(settings.mqtt.broker, defaults::MQTT_BROKER);
        assert!(!settings.telegram.is_configured());
        assert_eq!(settings.bind_addr(), "127.0.0.1:8000");
    }

    #[test]
    fn test_telegram_configured() {
        let settings = Settings {
            telegram: TelegramSettings {
                bot_token: Some("123:abc".to_string()),
                webhook_url: None,
            },
            ..Settings::default()
        };
        assert!(settings.telegram.is_configured());
    }
}
