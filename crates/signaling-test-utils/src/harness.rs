//! Sessions over in-memory channels.
//!
//! [`TestHarness`] wires a real hub, a mock verifier and a message store
//! into an [`AppState`]. [`TestHarness::connect`] opens a real [`Session`]
//! whose outbound sink is a channel, so tests see exactly the events a
//! WebSocket client would, in order.

use crate::fixtures;
use crate::mock_identity::MockIdentityVerifier;
use crate::mock_store::RecordingMessageStore;

use common::types::ConnectionId;
use signaling_service::actors::{ActorMetrics, SignalingHubHandle};
use signaling_service::directory::InMemoryUserDirectory;
use signaling_service::errors::AuthError;
use signaling_service::identity::{Identity, IdentityVerifier, JwtIdentityVerifier};
use signaling_service::protocol::{ClientEvent, ServerEvent};
use signaling_service::routes::AppState;
use signaling_service::session::Session;
use signaling_service::store::MessageStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::PollSender;

/// How long `next_event` waits before failing the test.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(1);

/// How long `expect_no_event` listens.
pub const QUIET_PERIOD: Duration = Duration::from_millis(50);

/// Mock verifier tokens: `tok-ann`, `tok-bo`, `tok-cy` resolve to the
/// fixture users; `tok-expired` fails as expired.
pub fn fixture_verifier() -> MockIdentityVerifier {
    MockIdentityVerifier::new()
        .with_user("tok-ann", fixtures::ann())
        .with_user("tok-bo", fixtures::bo())
        .with_user("tok-cy", fixtures::cy())
        .with_failure("tok-expired", AuthError::ExpiredCredential)
}

pub struct TestHarness {
    pub state: Arc<AppState>,
    /// Recorded `set_online` calls when the mock verifier is in use.
    pub verifier: Arc<MockIdentityVerifier>,
    pub directory: Arc<InMemoryUserDirectory>,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    /// Mock verifier, recording store, history limit 50.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    #[must_use]
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::default()
    }

    #[must_use]
    pub fn hub(&self) -> &SignalingHubHandle {
        &self.state.hub
    }

    /// Open a session for `identity`, skipping credential checks.
    pub async fn connect(&self, identity: Identity) -> TestConnection {
        let (tx, rx) = mpsc::channel(256);
        let session = Session::open(Arc::clone(&self.state), identity, PollSender::new(tx))
            .await
            .expect("session should open");
        TestConnection {
            session: Some(session),
            events: rx,
        }
    }

    /// Wait until the mock verifier has recorded `count` online-flag
    /// writes and return them.
    pub async fn online_calls(&self, count: usize) -> Vec<(String, bool)> {
        tokio::time::timeout(EVENT_TIMEOUT, async {
            loop {
                let calls = self.verifier.online_calls();
                if calls.len() >= count {
                    return calls;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for online-flag writes")
    }

    /// Open a session and discard the presence snapshot it triggers.
    pub async fn connect_quiet(&self, identity: Identity) -> TestConnection {
        let mut conn = self.connect(identity).await;
        conn.drain().await;
        conn
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.state.hub.cancel();
    }
}

pub struct TestHarnessBuilder {
    history_limit: usize,
    offline_write_delay: Option<Duration>,
    store: Option<Arc<dyn MessageStore>>,
    jwt_secret: Option<String>,
}

impl Default for TestHarnessBuilder {
    fn default() -> Self {
        Self {
            history_limit: 50,
            offline_write_delay: None,
            store: None,
            jwt_secret: None,
        }
    }
}

impl TestHarnessBuilder {
    #[must_use]
    pub fn history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Make the mock verifier's offline `set_online` writes slow.
    #[must_use]
    pub fn offline_write_delay(mut self, delay: Duration) -> Self {
        self.offline_write_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Verify real HS256 credentials signed with [`fixtures::TEST_SECRET`]
    /// against the seeded directory instead of the mock token table.
    #[must_use]
    pub fn jwt(mut self) -> Self {
        self.jwt_secret = Some(fixtures::TEST_SECRET.to_string());
        self
    }

    #[must_use]
    pub fn build(self) -> TestHarness {
        let directory = Arc::new(fixtures::seeded_directory());
        let mut mock_verifier = fixture_verifier();
        if let Some(delay) = self.offline_write_delay {
            mock_verifier = mock_verifier.with_offline_delay(delay);
        }
        let mock_verifier = Arc::new(mock_verifier);

        let verifier: Arc<dyn IdentityVerifier> = match self.jwt_secret {
            Some(secret) => Arc::new(JwtIdentityVerifier::new(
                secret.into(),
                Arc::clone(&directory) as _,
            )),
            None => Arc::clone(&mock_verifier) as _,
        };

        let store = self.store.unwrap_or_else(|| {
            Arc::new(
                RecordingMessageStore::new()
                    .with_user("u-ann", "Ann")
                    .with_user("u-bo", "Bo")
                    .with_user("u-cy", "Cy"),
            )
        });

        let actor_metrics = ActorMetrics::new();
        let hub = SignalingHubHandle::with_online_mirror(
            self.history_limit,
            Arc::clone(&actor_metrics),
            Arc::clone(&verifier),
        );

        let state = Arc::new(AppState {
            hub,
            verifier,
            messages: store,
            contacts: Arc::clone(&directory) as _,
            actor_metrics,
            connection_buffer: 64,
        });

        TestHarness {
            state,
            verifier: mock_verifier,
            directory,
        }
    }
}

/// One client connection as seen from the client side.
pub struct TestConnection {
    session: Option<Session>,
    events: mpsc::Receiver<ServerEvent>,
}

impl TestConnection {
    fn session(&self) -> &Session {
        self.session.as_ref().expect("connection already closed")
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.session().connection_id()
    }

    pub fn identity(&self) -> &Identity {
        self.session().identity()
    }

    /// Handle `event` as if it arrived on the socket.
    pub async fn send(&self, event: ClientEvent) {
        self.session()
            .handle_event(event)
            .await
            .expect("event should be handled");
    }

    /// Handle a raw text frame as if it arrived on the socket.
    pub async fn send_frame(&self, frame: &str) {
        self.session().handle_frame(frame).await;
    }

    /// Next outbound event; fails the test after [`EVENT_TIMEOUT`].
    pub async fn next_event(&mut self) -> ServerEvent {
        tokio::time::timeout(EVENT_TIMEOUT, self.events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("connection closed while waiting for event")
    }

    /// Next event that isn't an `online-users` snapshot.
    pub async fn next_non_presence(&mut self) -> ServerEvent {
        loop {
            match self.next_event().await {
                ServerEvent::OnlineUsers(_) => {}
                other => return other,
            }
        }
    }

    /// Fail if any event arrives within [`QUIET_PERIOD`].
    pub async fn expect_no_event(&mut self) {
        if let Ok(Some(event)) = tokio::time::timeout(QUIET_PERIOD, self.events.recv()).await {
            panic!("expected no event, got {event:?}");
        }
    }

    /// Collect everything that arrives until the connection goes quiet.
    pub async fn drain(&mut self) -> Vec<ServerEvent> {
        let mut drained = Vec::new();
        while let Ok(Some(event)) = tokio::time::timeout(QUIET_PERIOD, self.events.recv()).await {
            drained.push(event);
        }
        drained
    }

    /// Run the disconnect path.
    pub async fn close(mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
    }

    /// True once the outbound side has been closed and drained.
    pub async fn is_closed(&mut self) -> bool {
        matches!(
            tokio::time::timeout(EVENT_TIMEOUT, self.events.recv()).await,
            Ok(None)
        )
    }
}
