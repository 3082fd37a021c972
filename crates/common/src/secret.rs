//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used for credential secrets and bearer
//! tokens. `SecretString` implements `Debug` with redaction, so any struct
//! deriving `Debug` around one is safe to log.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct SigningConfig {
//!     issuer: String,
//!     secret: SecretString,
//! }
//!
//! let cfg = SigningConfig {
//!     issuer: "signaling".to_string(),
//!     secret: SecretString::from("hunter2"),
//! };
//!
//! assert!(!format!("{cfg:?}").contains("hunter2"));
//! assert_eq!(cfg.secret.expose_secret(), "hunter2");
//! ```
//!
//! Use `SecretString` for the credential signing secret and for any bearer
//! token held longer than a single call.

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("signing-key");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("signing-key"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("jwt-secret-value");
        assert_eq!(secret.expose_secret(), "jwt-secret-value");
    }

    #[test]
    fn test_deserialized_bearer_is_redacted() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct ConnectRequest {
            room: String,
            token: SecretString,
        }

        let json = r#"{"room": "standup", "token": "eyJhbGciOi.payload.sig"}"#;
        let req: ConnectRequest = serde_json::from_str(json).expect("deserialize");

        assert_eq!(req.token.expose_secret(), "eyJhbGciOi.payload.sig");
        let debug = format!("{req:?}");
        assert!(!debug.contains("eyJhbGciOi"));
        assert!(debug.contains("standup"));
    }
}
