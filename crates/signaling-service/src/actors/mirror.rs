//! Ordered writer for the user record's online flag.
//!
//! The hub queues a change on a user's first admit and last disconnect, in
//! the order it applied them. One task writes each change before taking the
//! next, so the stored flag always ends at the hub's latest view.

use crate::identity::IdentityVerifier;

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Pending changes before new ones are dropped.
const MIRROR_CHANNEL_BUFFER: usize = 1000;

#[derive(Debug)]
struct OnlineChange {
    user_id: String,
    online: bool,
}

#[derive(Debug, Clone)]
pub struct OnlineMirror {
    sender: mpsc::Sender<OnlineChange>,
}

impl OnlineMirror {
    /// Spawn the writer task. It stops once every handle is dropped and the
    /// queue is drained.
    #[must_use]
    pub fn spawn(verifier: Arc<dyn IdentityVerifier>) -> Self {
        let (sender, receiver) = mpsc::channel(MIRROR_CHANNEL_BUFFER);
        tokio::spawn(run(receiver, verifier));
        Self { sender }
    }

    /// Queue a change without waiting.
    pub fn record(&self, user_id: &str, online: bool) {
        let change = OnlineChange {
            user_id: user_id.to_string(),
            online,
        };
        if let Err(e) = self.sender.try_send(change) {
            warn!(
                target: "signaling.actor.mirror",
                user_id = %user_id,
                online = online,
                error = %e,
                "Online flag change dropped"
            );
        }
    }
}

async fn run(mut receiver: mpsc::Receiver<OnlineChange>, verifier: Arc<dyn IdentityVerifier>) {
    while let Some(change) = receiver.recv().await {
        match verifier.set_online(&change.user_id, change.online).await {
            Ok(()) => debug!(
                target: "signaling.actor.mirror",
                user_id = %change.user_id,
                online = change.online,
                "Online flag recorded"
            ),
            Err(e) => warn!(
                target: "signaling.actor.mirror",
                user_id = %change.user_id,
                online = change.online,
                error = %e,
                "Failed to record online flag"
            ),
        }
    }
    debug!(target: "signaling.actor.mirror", "Online mirror stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::errors::{AuthError, StoreError};
    use crate::identity::Identity;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Offline writes take longer than online ones.
    #[derive(Default)]
    struct SlowOfflineVerifier {
        writes: Mutex<Vec<bool>>,
    }

    #[async_trait]
    impl IdentityVerifier for SlowOfflineVerifier {
        async fn verify(&self, _credential: &str) -> Result<Identity, AuthError> {
            Err(AuthError::InvalidCredential)
        }

        async fn set_online(&self, _user_id: &str, online: bool) -> Result<(), StoreError> {
            if !online {
                tokio::time::sleep(Duration::from_millis(30)).await;
            }
            self.writes.lock().unwrap().push(online);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_writes_apply_in_queue_order() {
        let verifier = Arc::new(SlowOfflineVerifier::default());
        let mirror = OnlineMirror::spawn(Arc::clone(&verifier) as _);

        mirror.record("u-1", true);
        mirror.record("u-1", false);
        mirror.record("u-1", true);

        tokio::time::timeout(Duration::from_secs(1), async {
            while verifier.writes.lock().unwrap().len() < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("mirror should apply every change");

        assert_eq!(*verifier.writes.lock().unwrap(), vec![true, false, true]);
    }
}
