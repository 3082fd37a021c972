//! Identity verification: credential in, `{user id, display name}` out.
//!
//! The hub never sees credentials. A session calls [`IdentityVerifier::verify`]
//! once, before admission, and carries the resulting [`Identity`] for the
//! rest of the connection's life.

use crate::directory::UserDirectory;
use crate::errors::{AuthError, StoreError};

use async_trait::async_trait;
use common::jwt::{verify_user_token, JwtValidationError};
use common::secret::{ExposeSecret, SecretString};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Who a connection belongs to. Snapshot taken at admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
}

impl Identity {
    #[must_use]
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Resolves a credential to an identity and mirrors online state back to
/// the user record.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Verify `credential` and return the identity it names.
    async fn verify(&self, credential: &str) -> Result<Identity, AuthError>;

    /// Record that `user_id` has come online or gone offline.
    ///
    /// Called on the first admit and last disconnect of a user. Best effort.
    async fn set_online(&self, _user_id: &str, _online: bool) -> Result<(), StoreError> {
        Ok(())
    }
}

/// HS256 bearer verifier backed by a [`UserDirectory`].
pub struct JwtIdentityVerifier {
    secret: SecretString,
    directory: Arc<dyn UserDirectory>,
}

impl JwtIdentityVerifier {
    #[must_use]
    pub fn new(secret: SecretString, directory: Arc<dyn UserDirectory>) -> Self {
        Self { secret, directory }
    }
}

#[async_trait]
impl IdentityVerifier for JwtIdentityVerifier {
    async fn verify(&self, credential: &str) -> Result<Identity, AuthError> {
        if credential.is_empty() {
            return Err(AuthError::MissingCredential);
        }

        let claims = verify_user_token(credential, self.secret.expose_secret().as_bytes())
            .map_err(|e| match e {
                JwtValidationError::Expired => AuthError::ExpiredCredential,
                _ => AuthError::InvalidCredential,
            })?;

        match self.directory.find_user(&claims.id).await {
            Ok(Some(user)) => Ok(Identity::new(user.id, user.display_name)),
            Ok(None) => {
                debug!(target: "signaling.auth", "Credential names no known user");
                Err(AuthError::UnknownIdentity)
            }
            Err(e) => {
                warn!(target: "signaling.auth", error = %e, "User lookup failed during verification");
                Err(AuthError::InvalidCredential)
            }
        }
    }

    async fn set_online(&self, user_id: &str, online: bool) -> Result<(), StoreError> {
        self.directory.set_online(user_id, online).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::directory::{InMemoryUserDirectory, UserRecord};
    use common::jwt::{sign_user_token, UserClaims};
    use std::time::Duration;

    const SECRET: &str = "identity-test-secret";

    fn verifier() -> (JwtIdentityVerifier, Arc<InMemoryUserDirectory>) {
        let directory = Arc::new(InMemoryUserDirectory::from_records([UserRecord::new(
            "u-1", "Ann",
        )]));
        let verifier = JwtIdentityVerifier::new(
            SecretString::from(SECRET),
            Arc::clone(&directory) as Arc<dyn UserDirectory>,
        );
        (verifier, directory)
    }

    fn token_for(id: &str) -> String {
        let claims = UserClaims::issued_now(id, Duration::from_secs(600));
        sign_user_token(&claims, SECRET.as_bytes()).unwrap()
    }

    #[tokio::test]
    async fn test_verify_known_user() {
        let (verifier, _) = verifier();
        let identity = verifier.verify(&token_for("u-1")).await.unwrap();
        assert_eq!(identity, Identity::new("u-1", "Ann"));
    }

    #[tokio::test]
    async fn test_verify_missing_credential() {
        let (verifier, _) = verifier();
        assert_eq!(
            verifier.verify("").await.unwrap_err(),
            AuthError::MissingCredential
        );
    }

    #[tokio::test]
    async fn test_verify_unknown_user() {
        let (verifier, _) = verifier();
        assert_eq!(
            verifier.verify(&token_for("u-404")).await.unwrap_err(),
            AuthError::UnknownIdentity
        );
    }

    #[tokio::test]
    async fn test_verify_bad_signature() {
        let (verifier, _) = verifier();
        let claims = UserClaims::issued_now("u-1", Duration::from_secs(600));
        let forged = sign_user_token(&claims, b"other-secret").unwrap();
        assert_eq!(
            verifier.verify(&forged).await.unwrap_err(),
            AuthError::InvalidCredential
        );
    }

    #[tokio::test]
    async fn test_verify_expired() {
        let (verifier, _) = verifier();
        let now = chrono::Utc::now().timestamp();
        let claims = UserClaims {
            id: "u-1".to_string(),
            exp: now - 3600,
            iat: now - 7200,
        };
        let token = sign_user_token(&claims, SECRET.as_bytes()).unwrap();
        assert_eq!(
            verifier.verify(&token).await.unwrap_err(),
            AuthError::ExpiredCredential
        );
    }

    #[tokio::test]
    async fn test_set_online_mirrors_to_directory() {
        let (verifier, directory) = verifier();

        verifier.set_online("u-1", true).await.unwrap();
        assert!(directory.find_user("u-1").await.unwrap().unwrap().online);

        verifier.set_online("u-1", false).await.unwrap();
        assert!(!directory.find_user("u-1").await.unwrap().unwrap().online);
    }
}
