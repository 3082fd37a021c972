//! Signaling service configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields are redacted in Debug output.

use common::secret::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default WebSocket + presence API bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3001";

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Default number of room chat entries replayed to late joiners.
pub const DEFAULT_ROOM_CHAT_HISTORY_LIMIT: usize = 200;

/// Default per-connection outbound mailbox size.
pub const DEFAULT_CONNECTION_BUFFER: usize = 256;

/// Signaling service configuration.
#[derive(Clone)]
pub struct Config {
    /// HS256 secret for user credentials.
    /// Protected by `SecretString` to prevent accidental logging.
    pub jwt_secret: SecretString,

    /// WebSocket and presence API bind address (default: "0.0.0.0:3001").
    pub bind_address: String,

    /// Health endpoint bind address (default: "0.0.0.0:8081").
    pub health_bind_address: String,

    /// Room chat entries kept per room; 0 disables replay.
    pub room_chat_history_limit: usize,

    /// Outbound events buffered per connection before drops start.
    pub connection_buffer: usize,

    /// Optional JSON file seeding the in-process user directory.
    pub user_seed_path: Option<String>,

    /// Emit JSON log lines instead of the human-readable format.
    pub log_json: bool,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("jwt_secret", &"[REDACTED]")
            .field("bind_address", &self.bind_address)
            .field("health_bind_address", &self.health_bind_address)
            .field("room_chat_history_limit", &self.room_chat_history_limit)
            .field("connection_buffer", &self.connection_buffer)
            .field("user_seed_path", &self.user_seed_path)
            .field("log_json", &self.log_json)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// See [`Config::from_vars`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// - `MissingEnvVar` if `SIGNALING_JWT_SECRET` is absent
    /// - `InvalidValue` if the secret is empty or a numeric/boolean value
    ///   does not parse
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let jwt_secret = SecretString::from(
            vars.get("SIGNALING_JWT_SECRET")
                .ok_or_else(|| ConfigError::MissingEnvVar("SIGNALING_JWT_SECRET".to_string()))?
                .clone(),
        );
        if jwt_secret.expose_secret().is_empty() {
            return Err(ConfigError::InvalidValue(
                "SIGNALING_JWT_SECRET must not be empty".to_string(),
            ));
        }

        let bind_address = vars
            .get("SIGNALING_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let health_bind_address = vars
            .get("SIGNALING_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let room_chat_history_limit = parse_or(
            vars,
            "SIGNALING_ROOM_CHAT_HISTORY_LIMIT",
            DEFAULT_ROOM_CHAT_HISTORY_LIMIT,
        )?;

        let connection_buffer =
            parse_or(vars, "SIGNALING_CONNECTION_BUFFER", DEFAULT_CONNECTION_BUFFER)?;
        if connection_buffer == 0 {
            return Err(ConfigError::InvalidValue(
                "SIGNALING_CONNECTION_BUFFER must be at least 1".to_string(),
            ));
        }

        let user_seed_path = vars
            .get("SIGNALING_USER_SEED_PATH")
            .filter(|s| !s.is_empty())
            .cloned();

        let log_json = parse_or(vars, "SIGNALING_LOG_JSON", false)?;

        Ok(Config {
            jwt_secret,
            bind_address,
            health_bind_address,
            room_chat_history_limit,
            connection_buffer,
            user_seed_path,
            log_json,
        })
    }
}

fn parse_or<T: FromStr>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{key}={raw}"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([(
            "SIGNALING_JWT_SECRET".to_string(),
            "c2lnbmFsaW5nLXRlc3Qtc2VjcmV0".to_string(),
        )])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(
            config.jwt_secret.expose_secret(),
            "c2lnbmFsaW5nLXRlc3Qtc2VjcmV0"
        );
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.health_bind_address, DEFAULT_HEALTH_BIND_ADDRESS);
        assert_eq!(
            config.room_chat_history_limit,
            DEFAULT_ROOM_CHAT_HISTORY_LIMIT
        );
        assert_eq!(config.connection_buffer, DEFAULT_CONNECTION_BUFFER);
        assert!(config.user_seed_path.is_none());
        assert!(!config.log_json);
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let mut vars = base_vars();
        vars.insert(
            "SIGNALING_BIND_ADDRESS".to_string(),
            "127.0.0.1:4000".to_string(),
        );
        vars.insert(
            "SIGNALING_HEALTH_BIND_ADDRESS".to_string(),
            "127.0.0.1:9000".to_string(),
        );
        vars.insert(
            "SIGNALING_ROOM_CHAT_HISTORY_LIMIT".to_string(),
            "0".to_string(),
        );
        vars.insert("SIGNALING_CONNECTION_BUFFER".to_string(), "32".to_string());
        vars.insert(
            "SIGNALING_USER_SEED_PATH".to_string(),
            "/etc/signaling/users.json".to_string(),
        );
        vars.insert("SIGNALING_LOG_JSON".to_string(), "true".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.bind_address, "127.0.0.1:4000");
        assert_eq!(config.health_bind_address, "127.0.0.1:9000");
        assert_eq!(config.room_chat_history_limit, 0);
        assert_eq!(config.connection_buffer, 32);
        assert_eq!(
            config.user_seed_path.as_deref(),
            Some("/etc/signaling/users.json")
        );
        assert!(config.log_json);
    }

    #[test]
    fn test_from_vars_missing_jwt_secret() {
        let result = Config::from_vars(&HashMap::new());
        assert!(
            matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "SIGNALING_JWT_SECRET")
        );
    }

    #[test]
    fn test_from_vars_empty_jwt_secret() {
        let vars = HashMap::from([("SIGNALING_JWT_SECRET".to_string(), String::new())]);
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_from_vars_invalid_numbers() {
        let mut vars = base_vars();
        vars.insert(
            "SIGNALING_ROOM_CHAT_HISTORY_LIMIT".to_string(),
            "lots".to_string(),
        );
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(v)) if v.contains("SIGNALING_ROOM_CHAT_HISTORY_LIMIT")
        ));

        let mut vars = base_vars();
        vars.insert("SIGNALING_CONNECTION_BUFFER".to_string(), "-1".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_from_vars_zero_connection_buffer() {
        let mut vars = base_vars();
        vars.insert("SIGNALING_CONNECTION_BUFFER".to_string(), "0".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_from_vars_empty_seed_path_is_none() {
        let mut vars = base_vars();
        vars.insert("SIGNALING_USER_SEED_PATH".to_string(), String::new());
        let config = Config::from_vars(&vars).unwrap();
        assert!(config.user_seed_path.is_none());
    }

    #[test]
    fn test_debug_redacts_sensitive_fields() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("c2lnbmFsaW5n"));
    }
}
