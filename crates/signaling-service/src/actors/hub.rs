//! `SignalingHubActor` - single writer for presence and room state.
//!
//! The hub owns:
//! - the [`ConnectionRegistry`] (connection -> identity, derived online set)
//! - the [`RoomBroker`] (rooms, membership index, chat backlogs)
//! - a [`ConnectionActorHandle`] per registered connection
//! - optionally an [`OnlineMirror`], fed online/offline transitions in the
//!   order they happen
//!
//! Every mutation happens inside the actor loop, one message at a time, so
//! no reader can observe a half-updated member list. Outbound events are
//! queued on connection mailboxes with `try_send`; a stalled connection
//! loses events instead of stalling the hub.
//!
//! # Graceful Shutdown
//!
//! Cancelling the root token closes every registered connection and stops
//! the loop. Connection actors hold child tokens and stop with it.

use crate::errors::SignalingError;
use crate::identity::{Identity, IdentityVerifier};
use crate::observability::metrics as prom;
use crate::protocol::ServerEvent;
use crate::registry::ConnectionRegistry;
use crate::rooms::{Delivery, RoomBroker, RoomSnapshot};

use super::connection::ConnectionActorHandle;
use super::messages::{AdmitOutcome, DisconnectOutcome, HubMessage, HubStatus};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use super::mirror::OnlineMirror;

use common::types::ConnectionId;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Hub mailbox size.
const HUB_CHANNEL_BUFFER: usize = 1000;

/// Handle to the `SignalingHubActor`.
///
/// Cheap to clone. All methods wait for the hub to apply the request.
#[derive(Clone, Debug)]
pub struct SignalingHubHandle {
    sender: mpsc::Sender<HubMessage>,
    cancel_token: CancellationToken,
}

impl SignalingHubHandle {
    /// Spawn the hub and return a handle to it.
    ///
    /// `history_limit` caps the chat backlog kept per room.
    #[must_use]
    pub fn new(history_limit: usize, metrics: Arc<ActorMetrics>) -> Self {
        Self::spawn(history_limit, metrics, None)
    }

    /// Like [`Self::new`], and record each user's first admit and last
    /// disconnect through `verifier.set_online`, in hub order.
    #[must_use]
    pub fn with_online_mirror(
        history_limit: usize,
        metrics: Arc<ActorMetrics>,
        verifier: Arc<dyn IdentityVerifier>,
    ) -> Self {
        Self::spawn(history_limit, metrics, Some(OnlineMirror::spawn(verifier)))
    }

    fn spawn(
        history_limit: usize,
        metrics: Arc<ActorMetrics>,
        online_mirror: Option<OnlineMirror>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(HUB_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();

        let actor = SignalingHubActor {
            receiver,
            cancel_token: cancel_token.clone(),
            registry: ConnectionRegistry::new(),
            rooms: RoomBroker::new(history_limit),
            handles: HashMap::new(),
            online_mirror,
            metrics,
            mailbox: MailboxMonitor::new(ActorType::Hub, "hub"),
        };

        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
        }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> HubMessage,
    ) -> Result<T, SignalingError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|e| SignalingError::Channel(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| SignalingError::Channel(format!("response receive failed: {e}")))
    }

    /// Register an authenticated connection and broadcast presence.
    pub async fn admit(
        &self,
        identity: Identity,
        connection: ConnectionActorHandle,
    ) -> Result<AdmitOutcome, SignalingError> {
        self.request(|respond_to| HubMessage::Admit {
            identity,
            connection,
            respond_to,
        })
        .await?
    }

    /// Remove a connection from its room and the registry.
    ///
    /// `None` if the connection was never admitted.
    pub async fn disconnect(
        &self,
        connection_id: ConnectionId,
    ) -> Result<Option<DisconnectOutcome>, SignalingError> {
        self.request(|respond_to| HubMessage::Disconnect {
            connection_id,
            respond_to,
        })
        .await
    }

    /// Push `event` to every live connection of `user_id`.
    ///
    /// Returns how many connections it was queued on; 0 means offline.
    pub async fn deliver_to_user(
        &self,
        user_id: impl Into<String>,
        event: ServerEvent,
    ) -> Result<usize, SignalingError> {
        let user_id = user_id.into();
        self.request(|respond_to| HubMessage::DeliverToUser {
            user_id,
            event,
            respond_to,
        })
        .await
    }

    pub async fn deliver_to_connection(
        &self,
        connection_id: ConnectionId,
        event: ServerEvent,
    ) -> Result<bool, SignalingError> {
        self.request(|respond_to| HubMessage::DeliverToConnection {
            connection_id,
            event,
            respond_to,
        })
        .await
    }

    pub async fn join_room(
        &self,
        connection_id: ConnectionId,
        room_code: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Result<(), SignalingError> {
        let room_code = room_code.into();
        let display_name = display_name.into();
        self.request(|respond_to| HubMessage::JoinRoom {
            connection_id,
            room_code,
            display_name,
            respond_to,
        })
        .await
    }

    pub async fn leave_room(&self, connection_id: ConnectionId) -> Result<(), SignalingError> {
        self.request(|respond_to| HubMessage::LeaveRoom {
            connection_id,
            respond_to,
        })
        .await
    }

    /// Post to the connection's room. `None` uses the name it joined with.
    pub async fn room_chat(
        &self,
        connection_id: ConnectionId,
        text: impl Into<String>,
        sender_display_name: Option<String>,
    ) -> Result<(), SignalingError> {
        let text = text.into();
        self.request(|respond_to| HubMessage::RoomChat {
            connection_id,
            text,
            sender_display_name,
            respond_to,
        })
        .await
    }

    /// Relay an opaque payload. `false` if `to` is not live.
    pub async fn signal(
        &self,
        from: ConnectionId,
        to: ConnectionId,
        payload: Value,
    ) -> Result<bool, SignalingError> {
        self.request(|respond_to| HubMessage::Signal {
            from,
            to,
            payload,
            respond_to,
        })
        .await
    }

    /// Current online user ids, sorted.
    pub async fn online_users(&self) -> Result<Vec<String>, SignalingError> {
        self.request(|respond_to| HubMessage::OnlineUsers { respond_to })
            .await
    }

    pub async fn get_room(
        &self,
        room_code: impl Into<String>,
    ) -> Result<Option<RoomSnapshot>, SignalingError> {
        let room_code = room_code.into();
        self.request(|respond_to| HubMessage::GetRoom {
            room_code,
            respond_to,
        })
        .await
    }

    pub async fn get_status(&self) -> Result<HubStatus, SignalingError> {
        self.request(|respond_to| HubMessage::GetStatus { respond_to })
            .await
    }

    /// Cancel the hub; every connection is closed.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Token for a connection actor; cancelled with the hub.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

/// The `SignalingHubActor` implementation.
pub struct SignalingHubActor {
    receiver: mpsc::Receiver<HubMessage>,
    cancel_token: CancellationToken,
    registry: ConnectionRegistry,
    rooms: RoomBroker,
    handles: HashMap<ConnectionId, ConnectionActorHandle>,
    online_mirror: Option<OnlineMirror>,
    metrics: Arc<ActorMetrics>,
    mailbox: MailboxMonitor,
}

impl SignalingHubActor {
    #[instrument(skip_all, name = "signaling.actor.hub")]
    async fn run(mut self) {
        info!(target: "signaling.actor.hub", "SignalingHubActor started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "signaling.actor.hub",
                        "SignalingHubActor received cancellation signal"
                    );
                    self.shutdown();
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_enqueue();
                            self.handle_message(message);
                            self.mailbox.record_dequeue();
                            self.metrics.record_message_processed();
                        }
                        None => {
                            info!(
                                target: "signaling.actor.hub",
                                "SignalingHubActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "signaling.actor.hub",
            connections_remaining = self.registry.connection_count(),
            messages_processed = self.mailbox.messages_processed(),
            "SignalingHubActor stopped"
        );
    }

    fn handle_message(&mut self, message: HubMessage) {
        match message {
            HubMessage::Admit {
                identity,
                connection,
                respond_to,
            } => {
                let result = self.admit(identity, connection);
                let _ = respond_to.send(result);
            }

            HubMessage::Disconnect {
                connection_id,
                respond_to,
            } => {
                let outcome = self.disconnect(connection_id);
                let _ = respond_to.send(outcome);
            }

            HubMessage::DeliverToUser {
                user_id,
                event,
                respond_to,
            } => {
                let delivered = self.deliver_to_user(&user_id, &event);
                let _ = respond_to.send(delivered);
            }

            HubMessage::DeliverToConnection {
                connection_id,
                event,
                respond_to,
            } => {
                let delivered = self.dispatch(Delivery::new(connection_id, event));
                let _ = respond_to.send(delivered);
            }

            HubMessage::JoinRoom {
                connection_id,
                room_code,
                display_name,
                respond_to,
            } => {
                self.join_room(connection_id, &room_code, &display_name);
                let _ = respond_to.send(());
            }

            HubMessage::LeaveRoom {
                connection_id,
                respond_to,
            } => {
                let deliveries = self.rooms.leave(connection_id);
                self.dispatch_all(deliveries);
                self.update_gauges();
                let _ = respond_to.send(());
            }

            HubMessage::RoomChat {
                connection_id,
                text,
                sender_display_name,
                respond_to,
            } => {
                let sender = sender_display_name.as_deref();
                let deliveries = self.rooms.chat(connection_id, &text, sender);
                self.dispatch_all(deliveries);
                let _ = respond_to.send(());
            }

            HubMessage::Signal {
                from,
                to,
                payload,
                respond_to,
            } => {
                let delivered = self.dispatch(RoomBroker::signal(from, to, payload));
                let _ = respond_to.send(delivered);
            }

            HubMessage::OnlineUsers { respond_to } => {
                let _ = respond_to.send(self.registry.online_users());
            }

            HubMessage::GetRoom {
                room_code,
                respond_to,
            } => {
                let _ = respond_to.send(self.rooms.snapshot(&room_code));
            }

            HubMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(HubStatus {
                    connections: self.registry.connection_count(),
                    online_users: self.registry.online_count(),
                    rooms: self.rooms.room_count(),
                    messages_processed: self.mailbox.messages_processed(),
                });
            }
        }
    }

    fn admit(
        &mut self,
        identity: Identity,
        connection: ConnectionActorHandle,
    ) -> Result<AdmitOutcome, SignalingError> {
        let connection_id = connection.connection_id();
        if self.handles.contains_key(&connection_id) {
            return Err(SignalingError::Internal(
                "connection already admitted".to_string(),
            ));
        }

        let user_id = identity.user_id.clone();
        let came_online = self.registry.admit(connection_id, identity);
        self.handles.insert(connection_id, connection);

        info!(
            target: "signaling.actor.hub",
            connection_id = %connection_id,
            user_id = %user_id,
            came_online = came_online,
            total_connections = self.registry.connection_count(),
            "Connection admitted"
        );

        if came_online {
            self.mirror_online(&user_id, true);
        }
        self.broadcast_presence();
        self.update_gauges();

        Ok(AdmitOutcome { came_online })
    }

    /// Room leave first, then registry removal, then presence.
    fn disconnect(&mut self, connection_id: ConnectionId) -> Option<DisconnectOutcome> {
        let deliveries = self.rooms.leave(connection_id);
        self.dispatch_all(deliveries);

        self.handles.remove(&connection_id);
        let outcome = self.registry.remove(connection_id).map(|removed| {
            info!(
                target: "signaling.actor.hub",
                connection_id = %connection_id,
                user_id = %removed.identity.user_id,
                went_offline = removed.went_offline,
                total_connections = self.registry.connection_count(),
                "Connection removed"
            );
            DisconnectOutcome {
                user_id: removed.identity.user_id,
                went_offline: removed.went_offline,
            }
        });

        if let Some(removed) = &outcome {
            if removed.went_offline {
                self.mirror_online(&removed.user_id, false);
            }
            self.broadcast_presence();
        }
        self.update_gauges();
        outcome
    }

    fn join_room(&mut self, connection_id: ConnectionId, room_code: &str, display_name: &str) {
        if !self.handles.contains_key(&connection_id) {
            debug!(
                target: "signaling.actor.hub",
                connection_id = %connection_id,
                "Ignoring join from unregistered connection"
            );
            return;
        }

        let deliveries = self.rooms.join(connection_id, room_code, display_name);
        debug!(
            target: "signaling.actor.hub",
            connection_id = %connection_id,
            deliveries = deliveries.len(),
            "Connection joined room"
        );
        self.dispatch_all(deliveries);
        self.update_gauges();
    }

    fn deliver_to_user(&self, user_id: &str, event: &ServerEvent) -> usize {
        self.registry
            .connections_of(user_id)
            .iter()
            .filter(|id| self.dispatch(Delivery::new(**id, event.clone())))
            .count()
    }

    fn mirror_online(&self, user_id: &str, online: bool) {
        if let Some(mirror) = &self.online_mirror {
            mirror.record(user_id, online);
        }
    }

    /// Full online snapshot to every registered connection.
    fn broadcast_presence(&self) {
        let online = self.registry.online_users();
        for id in self.handles.keys() {
            self.dispatch(Delivery::new(*id, ServerEvent::OnlineUsers(online.clone())));
        }
    }

    fn dispatch_all(&self, deliveries: Vec<Delivery>) {
        for delivery in deliveries {
            self.dispatch(delivery);
        }
    }

    /// Queue one delivery. Returns whether it reached the mailbox.
    fn dispatch(&self, delivery: Delivery) -> bool {
        let event_name = delivery.event.event_name();
        let Some(handle) = self.handles.get(&delivery.to) else {
            debug!(
                target: "signaling.actor.hub",
                connection_id = %delivery.to,
                event = event_name,
                "Target connection not registered, dropping event"
            );
            prom::record_event_dropped("target_missing");
            self.metrics.record_event_dropped();
            return false;
        };

        match handle.push(delivery.event) {
            Ok(()) => true,
            Err(e) => {
                let reason = match e {
                    SignalingError::Channel(_) => "mailbox_full",
                    _ => "connection_closed",
                };
                warn!(
                    target: "signaling.actor.hub",
                    connection_id = %delivery.to,
                    event = event_name,
                    reason = reason,
                    "Dropping outbound event"
                );
                prom::record_event_dropped(reason);
                self.metrics.record_event_dropped();
                false
            }
        }
    }

    fn update_gauges(&self) {
        prom::set_connections_active(self.registry.connection_count());
        prom::set_online_users(self.registry.online_count());
        prom::set_rooms_active(self.rooms.room_count());
    }

    fn shutdown(&mut self) {
        for handle in self.handles.values() {
            handle.close("server shutting down");
        }
        info!(
            target: "signaling.actor.hub",
            connections_closed = self.handles.len(),
            "Closed all connections"
        );
        self.handles.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::connection::ConnectionActor;
    use serde_json::json;
    use std::time::Duration;
    use tokio_util::sync::PollSender;

    struct Client {
        handle: ConnectionActorHandle,
        events: mpsc::Receiver<ServerEvent>,
    }

    impl Client {
        fn id(&self) -> ConnectionId {
            self.handle.connection_id()
        }

        async fn next(&mut self) -> ServerEvent {
            tokio::time::timeout(Duration::from_secs(1), self.events.recv())
                .await
                .expect("timed out waiting for event")
                .expect("event stream closed")
        }

        async fn assert_idle(&mut self) {
            let next = tokio::time::timeout(Duration::from_millis(50), self.events.recv()).await;
            assert!(next.is_err(), "unexpected event: {next:?}");
        }
    }

    async fn connect(hub: &SignalingHubHandle, user_id: &str, name: &str) -> (Client, AdmitOutcome) {
        let (tx, rx) = mpsc::channel(64);
        let (handle, _task) = ConnectionActor::spawn(
            ConnectionId::new(),
            user_id.to_string(),
            hub.child_token(),
            64,
            ActorMetrics::new(),
            PollSender::new(tx),
        );
        let outcome = hub
            .admit(Identity::new(user_id, name), handle.clone())
            .await
            .unwrap();
        (Client { handle, events: rx }, outcome)
    }

    fn hub() -> SignalingHubHandle {
        SignalingHubHandle::new(50, ActorMetrics::new())
    }

    #[tokio::test]
    async fn test_admit_broadcasts_presence_to_everyone() {
        let hub = hub();
        let (mut ann, outcome) = connect(&hub, "u-1", "Ann").await;
        assert!(outcome.came_online);
        assert_eq!(ann.next().await, ServerEvent::OnlineUsers(vec!["u-1".into()]));

        let (mut bo, _) = connect(&hub, "u-2", "Bo").await;
        let both = ServerEvent::OnlineUsers(vec!["u-1".into(), "u-2".into()]);
        assert_eq!(ann.next().await, both);
        assert_eq!(bo.next().await, both);

        hub.cancel();
    }

    #[tokio::test]
    async fn test_second_connection_keeps_user_online() {
        let hub = hub();
        let (tab1, first) = connect(&hub, "u-1", "Ann").await;
        let (tab2, second) = connect(&hub, "u-1", "Ann").await;
        assert!(first.came_online);
        assert!(!second.came_online);

        let outcome = hub.disconnect(tab1.id()).await.unwrap().unwrap();
        assert!(!outcome.went_offline);
        assert_eq!(hub.online_users().await.unwrap(), vec!["u-1".to_string()]);

        let outcome = hub.disconnect(tab2.id()).await.unwrap().unwrap();
        assert!(outcome.went_offline);
        assert!(hub.online_users().await.unwrap().is_empty());

        hub.cancel();
    }

    #[tokio::test]
    async fn test_disconnect_unknown_connection_is_none() {
        let hub = hub();
        assert!(hub.disconnect(ConnectionId::new()).await.unwrap().is_none());
        hub.cancel();
    }

    #[tokio::test]
    async fn test_duplicate_admit_is_rejected() {
        let hub = hub();
        let (ann, _) = connect(&hub, "u-1", "Ann").await;
        let result = hub
            .admit(Identity::new("u-1", "Ann"), ann.handle.clone())
            .await;
        assert!(matches!(result, Err(SignalingError::Internal(_))));
        hub.cancel();
    }

    #[tokio::test]
    async fn test_deliver_to_user_fans_out_to_every_connection() {
        let hub = hub();
        let (mut tab1, _) = connect(&hub, "u-1", "Ann").await;
        let (mut tab2, _) = connect(&hub, "u-1", "Ann").await;
        tab1.next().await;
        tab1.next().await;
        tab2.next().await;

        let delivered = hub
            .deliver_to_user("u-1", ServerEvent::UserTyping("u-2".into()))
            .await
            .unwrap();
        assert_eq!(delivered, 2);
        assert_eq!(tab1.next().await, ServerEvent::UserTyping("u-2".into()));
        assert_eq!(tab2.next().await, ServerEvent::UserTyping("u-2".into()));

        let offline = hub
            .deliver_to_user("u-9", ServerEvent::UserTyping("u-2".into()))
            .await
            .unwrap();
        assert_eq!(offline, 0);

        hub.cancel();
    }

    #[tokio::test]
    async fn test_disconnect_leaves_room_before_presence() {
        let hub = hub();
        let (mut a, _) = connect(&hub, "u-1", "Ann").await;
        let (b, _) = connect(&hub, "u-2", "Bo").await;
        a.next().await;
        a.next().await;

        hub.join_room(a.id(), "r", "Ann").await.unwrap();
        hub.join_room(b.id(), "r", "Bo").await.unwrap();
        assert!(matches!(a.next().await, ServerEvent::RoomUsers(_)));
        assert!(matches!(a.next().await, ServerEvent::UserJoined { .. }));

        hub.disconnect(b.id()).await.unwrap();
        assert_eq!(a.next().await, ServerEvent::UserLeft(b.id()));
        assert_eq!(a.next().await, ServerEvent::OnlineUsers(vec!["u-1".into()]));

        let room = hub.get_room("r").await.unwrap().unwrap();
        assert_eq!(room.members.len(), 1);

        hub.disconnect(a.id()).await.unwrap();
        assert!(hub.get_room("r").await.unwrap().is_none());

        hub.cancel();
    }

    #[tokio::test]
    async fn test_signal_to_missing_target_reports_false() {
        let hub = hub();
        let (mut a, _) = connect(&hub, "u-1", "Ann").await;
        let (mut b, _) = connect(&hub, "u-2", "Bo").await;
        a.next().await;
        a.next().await;
        b.next().await;

        assert!(hub.signal(a.id(), b.id(), json!({"sdp": "x"})).await.unwrap());
        assert_eq!(
            b.next().await,
            ServerEvent::Signal {
                from_connection_id: a.id(),
                payload: json!({"sdp": "x"}),
            }
        );

        assert!(!hub
            .signal(a.id(), ConnectionId::new(), json!(null))
            .await
            .unwrap());
        a.assert_idle().await;

        hub.cancel();
    }

    #[tokio::test]
    async fn test_join_from_unregistered_connection_is_ignored() {
        let hub = hub();
        hub.join_room(ConnectionId::new(), "r", "Ghost").await.unwrap();
        assert!(hub.get_room("r").await.unwrap().is_none());
        hub.cancel();
    }

    #[tokio::test]
    async fn test_status_counts() {
        let hub = hub();
        let (a, _) = connect(&hub, "u-1", "Ann").await;
        connect(&hub, "u-1", "Ann").await;
        connect(&hub, "u-2", "Bo").await;
        hub.join_room(a.id(), "r", "Ann").await.unwrap();

        let status = hub.get_status().await.unwrap();
        assert_eq!(status.connections, 3);
        assert_eq!(status.online_users, 2);
        assert_eq!(status.rooms, 1);
        assert!(status.messages_processed >= 4);

        hub.cancel();
    }

    #[tokio::test]
    async fn test_cancel_closes_connections_and_stops_hub() {
        let hub = hub();
        let (mut a, _) = connect(&hub, "u-1", "Ann").await;
        a.next().await;

        hub.cancel();
        assert!(hub.is_cancelled());

        let closed = tokio::time::timeout(Duration::from_secs(1), a.events.recv())
            .await
            .expect("connection should close");
        assert!(closed.is_none());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matches!(
            hub.online_users().await,
            Err(SignalingError::Channel(_))
        ));
    }
}
