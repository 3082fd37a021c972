//! User credential (JWT) utilities.
//!
//! Connections authenticate with an HS256 token whose `id` claim names the
//! user record. This module provides:
//! - Size limits checked before any parsing
//! - `iat` validation with clock skew tolerance
//! - The `UserClaims` structure (user id redacted in Debug output)
//! - Signing and verification helpers over a shared secret
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - Only HS256 is accepted
//! - Error messages are generic; details go to debug logs
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{verify_user_token, JwtValidationError};
//!
//! match verify_user_token(token, secret.expose_secret().as_bytes()) {
//!     Ok(claims) => lookup(&claims.id),
//!     Err(JwtValidationError::Expired) => close(4001),
//!     Err(_) => close(4002),
//! }
//! ```

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// A user token is a few hundred bytes. Anything larger is rejected before
/// base64 decoding or signature verification.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default clock skew tolerance for the `iat` claim (5 minutes).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during user token validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token is not a structurally valid JWT, or its claims don't parse.
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Signature or algorithm check failed.
    #[error("The access token is invalid or expired")]
    InvalidSignature,

    /// Token `exp` is in the past.
    #[error("The access token has expired")]
    Expired,

    /// Token `iat` claim is too far in the future.
    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,

    /// Signing a token failed.
    #[error("Failed to sign access token")]
    Signing,
}

impl JwtValidationError {
    /// Whether the failure is an expiry (clients may refresh and retry).
    #[must_use]
    pub fn is_expired(&self) -> bool {
        matches!(self, JwtValidationError::Expired)
    }
}

// =============================================================================
// Claims Types
// =============================================================================

/// User token claims.
///
/// `id` is accepted under the `sub` name as well, so tokens minted by a
/// standard issuer verify without a custom claim.
#[derive(Clone, Serialize, Deserialize)]
pub struct UserClaims {
    /// User identifier - redacted in Debug output.
    #[serde(alias = "sub")]
    pub id: String,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issued-at timestamp (Unix epoch seconds).
    #[serde(default)]
    pub iat: i64,
}

impl fmt::Debug for UserClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserClaims")
            .field("id", &"[REDACTED]")
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .finish()
    }
}

impl UserClaims {
    /// Claims for `id`, issued now and valid for `ttl`.
    #[must_use]
    pub fn issued_now(id: impl Into<String>, ttl: Duration) -> Self {
        let now = chrono::Utc::now().timestamp();
        // ttl is a token lifetime, far below i64::MAX seconds
        #[allow(clippy::cast_possible_wrap)]
        let ttl_secs = ttl.as_secs() as i64;
        Self {
            id: id.into(),
            exp: now + ttl_secs,
            iat: now,
        }
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Reject tokens over [`MAX_JWT_SIZE_BYTES`].
///
/// # Errors
///
/// Returns `JwtValidationError::TokenTooLarge` if the token is oversized.
pub fn check_token_size(token: &str) -> Result<(), JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }
    Ok(())
}

/// Validate the `iat` (issued-at) claim with clock skew tolerance.
///
/// # Errors
///
/// Returns `JwtValidationError::IatTooFarInFuture` if `iat` is more than
/// `clock_skew` in the future.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    let now = chrono::Utc::now().timestamp();
    validate_iat_at(iat, clock_skew, now)
}

/// Deterministic `iat` validation against an explicit `now` timestamp.
pub(crate) fn validate_iat_at(
    iat: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    // clock_skew is minutes at most
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.as_secs() as i64;
    let max_iat = now + clock_skew_secs;

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

/// Verify an HS256 user token and return its claims.
///
/// Checks size, signature, `exp` and `iat`, in that order.
///
/// # Errors
///
/// - `TokenTooLarge` - oversized token
/// - `Expired` - `exp` in the past
/// - `InvalidSignature` - wrong secret or algorithm
/// - `MalformedToken` - anything else the decoder rejects
/// - `IatTooFarInFuture` - `iat` beyond [`DEFAULT_CLOCK_SKEW`]
pub fn verify_user_token(token: &str, secret: &[u8]) -> Result<UserClaims, JwtValidationError> {
    check_token_size(token)?;

    let validation = Validation::new(Algorithm::HS256);
    let data = decode::<UserClaims>(token, &DecodingKey::from_secret(secret), &validation)
        .map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            tracing::debug!(target: "common.jwt", error = %e, "Token rejected by decoder");
            match e.kind() {
                ErrorKind::ExpiredSignature => JwtValidationError::Expired,
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    JwtValidationError::InvalidSignature
                }
                _ => JwtValidationError::MalformedToken,
            }
        })?;

    validate_iat(data.claims.iat, DEFAULT_CLOCK_SKEW)?;

    Ok(data.claims)
}

/// Sign `claims` as an HS256 user token.
///
/// # Errors
///
/// Returns `JwtValidationError::Signing` if encoding fails.
pub fn sign_user_token(claims: &UserClaims, secret: &[u8]) -> Result<String, JwtValidationError> {
    encode(&Header::default(), claims, &EncodingKey::from_secret(secret)).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Token signing failed");
        JwtValidationError::Signing
    })
}
