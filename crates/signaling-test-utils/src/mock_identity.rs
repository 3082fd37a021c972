//! Mock identity verifier.
//!
//! # Example
//!
//! ```rust,ignore
//! let verifier = MockIdentityVerifier::new()
//!     .with_user("tok-ann", Identity::new("u-1", "Ann"))
//!     .with_failure("tok-old", AuthError::ExpiredCredential);
//!
//! assert!(verifier.verify("tok-ann").await.is_ok());
//! ```

use async_trait::async_trait;
use signaling_service::errors::{AuthError, StoreError};
use signaling_service::identity::{Identity, IdentityVerifier};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Verifier with a fixed token table. Unknown tokens are invalid.
#[derive(Debug, Default)]
pub struct MockIdentityVerifier {
    tokens: HashMap<String, Result<Identity, AuthError>>,
    online_calls: Mutex<Vec<(String, bool)>>,
    offline_delay: Option<Duration>,
}

impl MockIdentityVerifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_user(mut self, token: impl Into<String>, identity: Identity) -> Self {
        self.tokens.insert(token.into(), Ok(identity));
        self
    }

    #[must_use]
    pub fn with_failure(mut self, token: impl Into<String>, error: AuthError) -> Self {
        self.tokens.insert(token.into(), Err(error));
        self
    }

    /// Sleep for `delay` before recording an offline write.
    #[must_use]
    pub fn with_offline_delay(mut self, delay: Duration) -> Self {
        self.offline_delay = Some(delay);
        self
    }

    /// Every `set_online` call in order.
    pub fn online_calls(&self) -> Vec<(String, bool)> {
        self.online_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdentityVerifier for MockIdentityVerifier {
    async fn verify(&self, credential: &str) -> Result<Identity, AuthError> {
        if credential.is_empty() {
            return Err(AuthError::MissingCredential);
        }
        self.tokens
            .get(credential)
            .cloned()
            .unwrap_or(Err(AuthError::InvalidCredential))
    }

    async fn set_online(&self, user_id: &str, online: bool) -> Result<(), StoreError> {
        if let (false, Some(delay)) = (online, self.offline_delay) {
            tokio::time::sleep(delay).await;
        }
        self.online_calls
            .lock()
            .unwrap()
            .push((user_id.to_string(), online));
        Ok(())
    }
}
