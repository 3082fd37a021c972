//! `ConnectionActor` - per-WebSocket outbound writer.
//!
//! Each `ConnectionActor`:
//! - Owns the write half of exactly one transport
//! - Drains a bounded mailbox of [`ServerEvent`]s into it, in order
//! - Never blocks a producer: [`ConnectionActorHandle::push`] fails fast
//!   when the mailbox is full
//!
//! # Lifecycle
//!
//! 1. Spawned by the session right after authentication
//! 2. Runs until closed, cancelled, or the transport rejects a write
//! 3. Cancellation propagates from the hub's root token

use crate::errors::SignalingError;
use crate::observability::metrics as prom;
use crate::protocol::ServerEvent;

use super::messages::ConnectionMessage;
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};

use common::types::ConnectionId;
use futures_util::{Sink, SinkExt};
use std::fmt::Display;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Handle to a `ConnectionActor`.
#[derive(Clone, Debug)]
pub struct ConnectionActorHandle {
    sender: mpsc::Sender<ConnectionMessage>,
    cancel_token: CancellationToken,
    connection_id: ConnectionId,
    user_id: String,
    mailbox: Arc<MailboxMonitor>,
}

impl ConnectionActorHandle {
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Queue an event without waiting.
    ///
    /// # Errors
    ///
    /// - `Channel` if the mailbox is full (the event is dropped)
    /// - `ConnectionNotFound` if the actor has stopped
    pub fn push(&self, event: ServerEvent) -> Result<(), SignalingError> {
        match self.sender.try_send(ConnectionMessage::Push { event }) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.mailbox.record_drop();
                Err(SignalingError::Channel(
                    "connection mailbox full".to_string(),
                ))
            }
            Err(TrySendError::Closed(_)) => Err(SignalingError::ConnectionNotFound(
                self.connection_id.to_string(),
            )),
        }
    }

    /// Ask the actor to flush queued events and close the transport.
    ///
    /// Falls back to cancellation if the mailbox can't take the request.
    pub fn close(&self, reason: impl Into<String>) {
        let reason = reason.into();
        if self
            .sender
            .try_send(ConnectionMessage::Close { reason })
            .is_err()
        {
            self.cancel_token.cancel();
        }
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Whether the actor has stopped reading its mailbox.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// The `ConnectionActor` implementation, generic over the transport sink.
pub struct ConnectionActor<S> {
    connection_id: ConnectionId,
    user_id: String,
    receiver: mpsc::Receiver<ConnectionMessage>,
    cancel_token: CancellationToken,
    sink: Pin<Box<S>>,
    metrics: Arc<ActorMetrics>,
    mailbox: Arc<MailboxMonitor>,
}

impl<S> ConnectionActor<S>
where
    S: Sink<ServerEvent> + Send + 'static,
    S::Error: Display,
{
    /// Spawn a connection actor writing to `sink`.
    ///
    /// `buffer` is the mailbox size; it must be at least 1.
    pub fn spawn(
        connection_id: ConnectionId,
        user_id: String,
        cancel_token: CancellationToken,
        buffer: usize,
        metrics: Arc<ActorMetrics>,
        sink: S,
    ) -> (ConnectionActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let mailbox = Arc::new(MailboxMonitor::new(
            ActorType::Connection,
            connection_id.to_string(),
        ));

        let actor = Self {
            connection_id,
            user_id: user_id.clone(),
            receiver,
            cancel_token: cancel_token.clone(),
            sink: Box::pin(sink),
            metrics,
            mailbox: Arc::clone(&mailbox),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = ConnectionActorHandle {
            sender,
            cancel_token,
            connection_id,
            user_id,
            mailbox,
        };

        (handle, task_handle)
    }

    #[instrument(
        skip_all,
        name = "signaling.actor.connection",
        fields(connection_id = %self.connection_id)
    )]
    async fn run(mut self) {
        debug!(
            target: "signaling.actor.connection",
            connection_id = %self.connection_id,
            "ConnectionActor started"
        );
        self.metrics.connection_created();

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "signaling.actor.connection",
                        connection_id = %self.connection_id,
                        "ConnectionActor received cancellation signal"
                    );
                    self.close_sink("cancelled").await;
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_enqueue();
                            let should_exit = self.handle_message(message).await;
                            self.mailbox.record_dequeue();
                            self.metrics.record_message_processed();

                            if should_exit {
                                break;
                            }
                        }
                        None => {
                            debug!(
                                target: "signaling.actor.connection",
                                connection_id = %self.connection_id,
                                "ConnectionActor channel closed, exiting"
                            );
                            self.close_sink("handle dropped").await;
                            break;
                        }
                    }
                }
            }
        }

        self.metrics.connection_closed();
        info!(
            target: "signaling.actor.connection",
            connection_id = %self.connection_id,
            messages_processed = self.mailbox.messages_processed(),
            "ConnectionActor stopped"
        );
    }

    /// Returns true if the actor should exit.
    async fn handle_message(&mut self, message: ConnectionMessage) -> bool {
        match message {
            ConnectionMessage::Push { event } => {
                let event_name = event.event_name();
                if let Err(e) = self.sink.send(event).await {
                    warn!(
                        target: "signaling.actor.connection",
                        connection_id = %self.connection_id,
                        event = event_name,
                        error = %e,
                        "Transport write failed, stopping connection actor"
                    );
                    prom::record_event_dropped("transport_closed");
                    self.metrics.record_event_dropped();
                    return true;
                }
                false
            }

            ConnectionMessage::Close { reason } => {
                // Events queued after Close are discarded with the mailbox.
                self.close_sink(&reason).await;
                true
            }
        }
    }

    async fn close_sink(&mut self, reason: &str) {
        if let Err(e) = self.sink.close().await {
            debug!(
                target: "signaling.actor.connection",
                connection_id = %self.connection_id,
                reason = reason,
                error = %e,
                "Transport close failed"
            );
        } else {
            debug!(
                target: "signaling.actor.connection",
                connection_id = %self.connection_id,
                user_id = %self.user_id,
                reason = reason,
                "Transport closed"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_util::sync::PollSender;

    fn spawn_with_channel(
        buffer: usize,
    ) -> (
        ConnectionActorHandle,
        JoinHandle<()>,
        mpsc::Receiver<ServerEvent>,
        Arc<ActorMetrics>,
    ) {
        let (tx, rx) = mpsc::channel(64);
        let metrics = ActorMetrics::new();
        let (handle, task) = ConnectionActor::spawn(
            ConnectionId::new(),
            "u-1".to_string(),
            CancellationToken::new(),
            buffer,
            Arc::clone(&metrics),
            PollSender::new(tx),
        );
        (handle, task, rx, metrics)
    }

    #[tokio::test]
    async fn test_push_is_written_in_order() {
        let (handle, _task, mut rx, _) = spawn_with_channel(8);

        handle.push(ServerEvent::UserTyping("u-2".into())).unwrap();
        handle.push(ServerEvent::UserStopTyping("u-2".into())).unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            ServerEvent::UserTyping("u-2".into())
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            ServerEvent::UserStopTyping("u-2".into())
        );
    }

    #[tokio::test]
    async fn test_close_stops_actor_and_closes_sink() {
        let (handle, task, mut rx, metrics) = spawn_with_channel(8);

        handle.push(ServerEvent::OnlineUsers(vec![])).unwrap();
        handle.close("bye");

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("actor should stop")
            .unwrap();

        assert_eq!(rx.recv().await.unwrap(), ServerEvent::OnlineUsers(vec![]));
        assert!(rx.recv().await.is_none(), "sink should be closed");
        assert!(handle.is_closed());
        assert_eq!(metrics.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_stops_actor() {
        let (handle, task, _rx, _) = spawn_with_channel(8);
        handle.cancel();
        assert!(handle.is_cancelled());

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("actor should stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_push_after_stop_reports_not_found() {
        let (handle, task, _rx, _) = spawn_with_channel(8);
        handle.cancel();
        task.await.unwrap();

        assert!(matches!(
            handle.push(ServerEvent::OnlineUsers(vec![])),
            Err(SignalingError::ConnectionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_full_mailbox_drops_without_blocking() {
        // Sink with capacity 1 that nobody reads, so the actor stalls on
        // the second write and the mailbox fills up behind it.
        let (tx, _rx) = mpsc::channel(1);
        let (handle, _task) = ConnectionActor::spawn(
            ConnectionId::new(),
            "u-1".to_string(),
            CancellationToken::new(),
            1,
            ActorMetrics::new(),
            PollSender::new(tx),
        );

        let mut full = false;
        for _ in 0..16 {
            if let Err(SignalingError::Channel(_)) =
                handle.push(ServerEvent::UserTyping("u-2".into()))
            {
                full = true;
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(full, "a stalled transport must surface as a full mailbox");
        assert_eq!(handle.mailbox.messages_dropped(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_stops_actor() {
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let metrics = ActorMetrics::new();
        let (handle, task) = ConnectionActor::spawn(
            ConnectionId::new(),
            "u-1".to_string(),
            CancellationToken::new(),
            8,
            Arc::clone(&metrics),
            PollSender::new(tx),
        );

        handle.push(ServerEvent::OnlineUsers(vec![])).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("actor should stop on write failure")
            .unwrap();
        assert_eq!(metrics.dropped_count(), 1);
    }
}
