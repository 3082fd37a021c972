//! Signaling service error types.
//!
//! Internal details are logged server-side but not exposed to clients.
//! Only authentication failures and persistence failures ever reach a
//! client, and both use fixed messages.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Signaling service error type.
///
/// Maps to client-facing error codes:
/// - `Auth`: `UNAUTHORIZED` (2)
/// - `ConnectionNotFound`: `NOT_FOUND` (4)
/// - `Persistence`, `Channel`, `Config`, `Internal`: `INTERNAL_ERROR` (6)
#[derive(Debug, Error)]
pub enum SignalingError {
    /// Credential verification failed.
    #[error("Authentication failed: {0}")]
    Auth(AuthError),

    /// Message or presence persistence failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Target connection is not registered.
    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    /// Actor mailbox closed or reply dropped.
    #[error("Channel error: {0}")]
    Channel(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Credential verification errors.
///
/// Every variant renders the same client message so a caller can't probe
/// which users exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No credential supplied.
    #[error("Missing credential")]
    MissingCredential,

    /// Credential failed signature or format checks.
    #[error("Invalid credential")]
    InvalidCredential,

    /// Credential is past its expiry.
    #[error("Expired credential")]
    ExpiredCredential,

    /// Credential is valid but names no known user.
    #[error("Unknown identity")]
    UnknownIdentity,
}

impl AuthError {
    /// WebSocket close code sent before dropping an unauthenticated socket.
    ///
    /// 4001 for expiry so clients know to refresh, 4002 for everything else.
    #[must_use]
    pub const fn close_code(&self) -> u16 {
        match self {
            AuthError::ExpiredCredential => 4001,
            AuthError::MissingCredential
            | AuthError::InvalidCredential
            | AuthError::UnknownIdentity => 4002,
        }
    }

    /// Bounded label for metrics.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => "missing",
            AuthError::InvalidCredential => "invalid",
            AuthError::ExpiredCredential => "expired",
            AuthError::UnknownIdentity => "unknown_identity",
        }
    }

    /// Returns a client-safe message.
    #[must_use]
    pub fn client_message(&self) -> &'static str {
        match self {
            AuthError::ExpiredCredential => "Token expired",
            AuthError::MissingCredential
            | AuthError::InvalidCredential
            | AuthError::UnknownIdentity => "Auth failed",
        }
    }
}

/// Collaborator (message store, contact store, user directory) failure.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Backend unavailable or rejected the write.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Referenced record does not exist.
    #[error("Record not found: {0}")]
    NotFound(String),
}

impl SignalingError {
    /// Returns the client-facing error code for this error.
    #[must_use]
    pub fn error_code(&self) -> i32 {
        match self {
            SignalingError::Auth(_) => 2,                // UNAUTHORIZED
            SignalingError::ConnectionNotFound(_) => 4, // NOT_FOUND
            SignalingError::Persistence(_)
            | SignalingError::Channel(_)
            | SignalingError::Config(_)
            | SignalingError::Internal(_) => 6, // INTERNAL_ERROR
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            SignalingError::Auth(e) => e.client_message().to_string(),
            SignalingError::Persistence(_) => "Failed to send message".to_string(),
            SignalingError::ConnectionNotFound(_) => "Connection not found".to_string(),
            SignalingError::Channel(_) | SignalingError::Config(_) | SignalingError::Internal(_) => {
                "An internal error occurred".to_string()
            }
        }
    }
}

impl From<AuthError> for SignalingError {
    fn from(err: AuthError) -> Self {
        SignalingError::Auth(err)
    }
}

impl From<StoreError> for SignalingError {
    fn from(err: StoreError) -> Self {
        SignalingError::Persistence(err.to_string())
    }
}

/// JSON error body for HTTP endpoints.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl IntoResponse for SignalingError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            SignalingError::Auth(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            SignalingError::ConnectionNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            SignalingError::Persistence(_)
            | SignalingError::Channel(_)
            | SignalingError::Config(_)
            | SignalingError::Internal(_) => {
                tracing::error!(target: "signaling.http", error = %self, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let body = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.client_message(),
            },
        };

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            if let Ok(header_value) = "Bearer realm=\"signaling\", error=\"invalid_token\"".parse() {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        response
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(
            SignalingError::Auth(AuthError::InvalidCredential).error_code(),
            2
        );
        assert_eq!(
            SignalingError::ConnectionNotFound("c-1".to_string()).error_code(),
            4
        );
        assert_eq!(
            SignalingError::Persistence("timeout".to_string()).error_code(),
            6
        );
        assert_eq!(
            SignalingError::Channel("closed".to_string()).error_code(),
            6
        );
        assert_eq!(SignalingError::Config("bad".to_string()).error_code(), 6);
        assert_eq!(SignalingError::Internal("x".to_string()).error_code(), 6);
    }

    #[test]
    fn test_client_messages_hide_internal_details() {
        let store_err = SignalingError::Persistence("connection refused at 10.0.0.7:27017".to_string());
        assert!(!store_err.client_message().contains("10.0.0.7"));
        assert_eq!(store_err.client_message(), "Failed to send message");

        let channel_err = SignalingError::Channel("hub mailbox closed".to_string());
        assert_eq!(channel_err.client_message(), "An internal error occurred");
    }

    #[test]
    fn test_auth_errors_do_not_reveal_which_check_failed() {
        let unknown = SignalingError::Auth(AuthError::UnknownIdentity).client_message();
        let invalid = SignalingError::Auth(AuthError::InvalidCredential).client_message();
        let missing = SignalingError::Auth(AuthError::MissingCredential).client_message();
        assert_eq!(unknown, invalid);
        assert_eq!(invalid, missing);
    }

    #[test]
    fn test_close_codes() {
        assert_eq!(AuthError::ExpiredCredential.close_code(), 4001);
        assert_eq!(AuthError::InvalidCredential.close_code(), 4002);
        assert_eq!(AuthError::MissingCredential.close_code(), 4002);
        assert_eq!(AuthError::UnknownIdentity.close_code(), 4002);
    }

    #[test]
    fn test_store_error_conversion() {
        let err: SignalingError = StoreError::Unavailable("db down".to_string()).into();
        assert!(matches!(err, SignalingError::Persistence(_)));
        assert_eq!(err.error_code(), 6);
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            format!("{}", SignalingError::Auth(AuthError::ExpiredCredential)),
            "Authentication failed: Expired credential"
        );
        assert_eq!(
            format!("{}", StoreError::NotFound("user u-9".to_string())),
            "Record not found: user u-9"
        );
    }

    #[test]
    fn test_into_response_status_and_header() {
        let response = SignalingError::Auth(AuthError::ExpiredCredential).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key("WWW-Authenticate"));

        let response = SignalingError::Channel("hub gone".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!response.headers().contains_key("WWW-Authenticate"));
    }
}
