//! Per-connection session: admission, inbound dispatch and cleanup.
//!
//! A session is created only after the credential has been verified. It
//! spawns the connection actor that owns the write half, admits the
//! connection into the hub, then handles inbound frames one at a time
//! until the transport goes away. [`Session::close`] is the single exit
//! path and always runs the room leave and registry removal.

use crate::actors::{ActorType, ConnectionActor, ConnectionActorHandle};
use crate::errors::SignalingError;
use crate::identity::Identity;
use crate::observability::metrics as prom;
use crate::protocol::{self, ClientEvent, ServerEvent};
use crate::relay;
use crate::routes::AppState;

use common::types::ConnectionId;
use futures_util::Sink;
use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// How long `close` waits for the connection actor to flush and stop.
const CONNECTION_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

pub struct Session {
    identity: Identity,
    connection: ConnectionActorHandle,
    task: JoinHandle<()>,
    state: Arc<AppState>,
}

impl Session {
    /// Spawn the connection actor over `sink` and admit it.
    ///
    /// # Errors
    ///
    /// Returns `Channel` if the hub is gone; the connection actor is
    /// stopped before returning.
    #[instrument(skip_all, name = "signaling.session.open", fields(user_id = %identity.user_id))]
    pub async fn open<S>(
        state: Arc<AppState>,
        identity: Identity,
        sink: S,
    ) -> Result<Self, SignalingError>
    where
        S: Sink<ServerEvent> + Send + 'static,
        S::Error: Display,
    {
        let connection_id = ConnectionId::new();
        let (connection, task) = ConnectionActor::spawn(
            connection_id,
            identity.user_id.clone(),
            state.hub.child_token(),
            state.connection_buffer,
            Arc::clone(&state.actor_metrics),
            sink,
        );

        let outcome = match state.hub.admit(identity.clone(), connection.clone()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                connection.cancel();
                return Err(e);
            }
        };

        info!(
            target: "signaling.session",
            connection_id = %connection_id,
            user_id = %identity.user_id,
            came_online = outcome.came_online,
            "Session opened"
        );

        Ok(Self {
            identity,
            connection,
            task,
            state,
        })
    }

    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection.connection_id()
    }

    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Decode and handle one inbound text frame. Malformed frames and
    /// handling failures are logged and otherwise ignored.
    pub async fn handle_frame(&self, frame: &str) {
        match protocol::decode(frame) {
            Ok(event) => {
                let event_name = event.event_name();
                if let Err(e) = self.handle_event(event).await {
                    warn!(
                        target: "signaling.session",
                        connection_id = %self.connection_id(),
                        event = event_name,
                        error = %e,
                        "Failed to handle event"
                    );
                }
            }
            Err(e) => {
                debug!(
                    target: "signaling.session",
                    connection_id = %self.connection_id(),
                    frame_len = frame.len(),
                    error = %e,
                    "Ignoring malformed frame"
                );
            }
        }
    }

    /// Handle one decoded client event.
    ///
    /// # Errors
    ///
    /// Only hub channel failures. Store failures are reported to the
    /// client as `message-error`.
    pub async fn handle_event(&self, event: ClientEvent) -> Result<(), SignalingError> {
        let event_name = event.event_name();
        let started = Instant::now();
        prom::record_event(event_name);

        let hub = &self.state.hub;
        let id = self.connection_id();

        let result = match event {
            ClientEvent::JoinCall(request) => {
                if request.room_code().is_empty() {
                    debug!(target: "signaling.session", connection_id = %id, "Ignoring join-call without room code");
                    Ok(())
                } else {
                    hub.join_room(id, request.room_code(), request.display_name())
                        .await
                }
            }

            ClientEvent::Signal(request) => hub
                .signal(id, request.to_connection_id, request.payload)
                .await
                .map(|delivered| {
                    if !delivered {
                        debug!(
                            target: "signaling.session",
                            connection_id = %id,
                            "Signal target not connected"
                        );
                    }
                }),

            ClientEvent::RoomChatMessage(request) => {
                let sender = Some(request.sender_display_name).filter(|name| !name.is_empty());
                hub.room_chat(id, request.text, sender).await
            }

            ClientEvent::LeaveCall => hub.leave_room(id).await,

            ClientEvent::SendMessage(request) => relay::send_message(
                hub,
                self.state.messages.as_ref(),
                id,
                &self.identity,
                request,
            )
            .await
            .map(|_| ()),

            ClientEvent::Typing(receiver_id) => relay::typing(hub, &self.identity, &receiver_id)
                .await
                .map(|_| ()),

            ClientEvent::StopTyping(receiver_id) => {
                relay::stop_typing(hub, &self.identity, &receiver_id)
                    .await
                    .map(|_| ())
            }

            ClientEvent::CallUser(request) => relay::call_user(hub, &self.identity, request)
                .await
                .map(|_| ()),

            ClientEvent::MarkRead(sender_id) => relay::mark_read(
                hub,
                self.state.messages.as_ref(),
                id,
                &self.identity,
                &sender_id,
            )
            .await
            .map(|_| ()),
        };

        prom::record_message_latency(event_name, started.elapsed());
        result
    }

    /// Leave the room, unregister and stop the connection actor. Runs for
    /// every disconnect reason.
    #[instrument(skip_all, name = "signaling.session.close", fields(connection_id = %self.connection_id()))]
    pub async fn close(self) {
        let connection_id = self.connection_id();

        if let Err(e) = self.state.hub.disconnect(connection_id).await {
            warn!(
                target: "signaling.session",
                connection_id = %connection_id,
                error = %e,
                "Hub unavailable during disconnect"
            );
        }

        self.connection.close("session closed");
        match tokio::time::timeout(CONNECTION_DRAIN_TIMEOUT, self.task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_panic() => {
                self.state.actor_metrics.record_panic(ActorType::Connection);
                prom::record_actor_panic(ActorType::Connection.as_str());
            }
            Ok(Err(_)) => {}
            Err(_) => {
                debug!(
                    target: "signaling.session",
                    connection_id = %connection_id,
                    "Connection actor did not stop in time, cancelling"
                );
                self.connection.cancel();
            }
        }

        info!(
            target: "signaling.session",
            connection_id = %connection_id,
            user_id = %self.identity.user_id,
            "Session closed"
        );
    }
}
