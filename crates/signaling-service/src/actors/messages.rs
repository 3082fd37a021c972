//! Actor message types.
//!
//! Request/reply messages carry a `oneshot` sender; the actor answers once
//! the mutation is applied and every resulting delivery is queued on the
//! target connections' mailboxes.

use crate::errors::SignalingError;
use crate::identity::Identity;
use crate::protocol::ServerEvent;
use crate::rooms::RoomSnapshot;

use super::connection::ConnectionActorHandle;

use common::types::ConnectionId;
use serde_json::Value;
use tokio::sync::oneshot;

/// Messages to the `SignalingHubActor`.
#[derive(Debug)]
pub enum HubMessage {
    /// Register an authenticated connection and broadcast presence.
    Admit {
        identity: Identity,
        connection: ConnectionActorHandle,
        respond_to: oneshot::Sender<Result<AdmitOutcome, SignalingError>>,
    },

    /// Leave the connection's room, unregister it and broadcast presence.
    Disconnect {
        connection_id: ConnectionId,
        respond_to: oneshot::Sender<Option<DisconnectOutcome>>,
    },

    /// Push `event` to every live connection of `user_id`.
    DeliverToUser {
        user_id: String,
        event: ServerEvent,
        /// Number of connections the event was queued on.
        respond_to: oneshot::Sender<usize>,
    },

    /// Push `event` to one connection.
    DeliverToConnection {
        connection_id: ConnectionId,
        event: ServerEvent,
        respond_to: oneshot::Sender<bool>,
    },

    JoinRoom {
        connection_id: ConnectionId,
        room_code: String,
        display_name: String,
        respond_to: oneshot::Sender<()>,
    },

    LeaveRoom {
        connection_id: ConnectionId,
        respond_to: oneshot::Sender<()>,
    },

    RoomChat {
        connection_id: ConnectionId,
        text: String,
        /// `None` falls back to the name recorded at join.
        sender_display_name: Option<String>,
        respond_to: oneshot::Sender<()>,
    },

    Signal {
        from: ConnectionId,
        to: ConnectionId,
        payload: Value,
        /// `false` if the target connection is not live.
        respond_to: oneshot::Sender<bool>,
    },

    OnlineUsers {
        respond_to: oneshot::Sender<Vec<String>>,
    },

    GetRoom {
        room_code: String,
        respond_to: oneshot::Sender<Option<RoomSnapshot>>,
    },

    GetStatus {
        respond_to: oneshot::Sender<HubStatus>,
    },
}

/// Result of admitting a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmitOutcome {
    /// This is the user's first live connection.
    pub came_online: bool,
}

/// Result of disconnecting a registered connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectOutcome {
    pub user_id: String,
    /// That was the user's last live connection.
    pub went_offline: bool,
}

/// Hub counters at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubStatus {
    pub connections: usize,
    pub online_users: usize,
    pub rooms: usize,
    pub messages_processed: u64,
}

/// Messages to a `ConnectionActor`.
#[derive(Debug)]
pub enum ConnectionMessage {
    /// Write one event to the transport.
    Push { event: ServerEvent },

    /// Flush and close the transport.
    Close { reason: String },
}
