//! Wire protocol: the closed set of events a client may send and receive.
//!
//! Every WebSocket text frame is one JSON object:
//!
//! ```json
//! {"event": "send-message", "data": {"receiverId": "u-2", "text": "hi"}}
//! ```
//!
//! `event` selects the variant; `data` carries its payload and may be
//! omitted for events without one (`leave-call`). Frames that don't decode
//! into a [`ClientEvent`] are dropped by the session without a reply.

use crate::store::Message;
use common::types::ConnectionId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Display name used when a joiner doesn't supply one.
pub const DEFAULT_DISPLAY_NAME: &str = "Participant";

/// Events accepted from a client.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Join (or re-join) a mesh room.
    JoinCall(JoinCallRequest),
    /// Relay an opaque SDP/ICE payload to another connection.
    Signal(SignalRequest),
    /// Post a chat line to the caller's current room.
    RoomChatMessage(RoomChatRequest),
    /// Leave the caller's current room without disconnecting.
    LeaveCall,
    /// Send a persisted direct message.
    SendMessage(SendMessageRequest),
    /// Typing indicator to `receiverId`.
    Typing(String),
    /// Typing stopped indicator to `receiverId`.
    StopTyping(String),
    /// Ring another user.
    CallUser(CallUserRequest),
    /// Mark every message from `senderId` to the caller as read.
    MarkRead(String),
}

/// `join-call` payload. Accepts a bare room code string as well.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum JoinCallRequest {
    Code(String),
    Fields {
        #[serde(rename = "roomCode", alias = "path")]
        room_code: String,
        #[serde(
            rename = "displayName",
            alias = "userName",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        display_name: Option<String>,
    },
}

impl JoinCallRequest {
    /// The room code to join.
    #[must_use]
    pub fn room_code(&self) -> &str {
        match self {
            JoinCallRequest::Code(code) => code,
            JoinCallRequest::Fields { room_code, .. } => room_code,
        }
    }

    /// The display name, falling back to [`DEFAULT_DISPLAY_NAME`] when
    /// absent or empty.
    #[must_use]
    pub fn display_name(&self) -> &str {
        match self {
            JoinCallRequest::Fields {
                display_name: Some(name),
                ..
            } if !name.is_empty() => name,
            _ => DEFAULT_DISPLAY_NAME,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalRequest {
    pub to_connection_id: ConnectionId,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomChatRequest {
    #[serde(default)]
    pub text: String,
    #[serde(alias = "sender", default)]
    pub sender_display_name: String,
}

/// Missing fields decode as empty strings so the relay's empty-input
/// no-op applies instead of a decode failure.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[serde(default)]
    pub receiver_id: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallUserRequest {
    pub receiver_id: String,
    #[serde(alias = "meetingId", default)]
    pub meeting_code: String,
}

/// Events pushed to a client.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Full snapshot of online user ids.
    OnlineUsers(Vec<String>),
    /// A direct message addressed to this user.
    NewMessage(Message),
    /// Echo of a direct message this user sent.
    MessageSent(Message),
    /// A direct message this user sent could not be stored.
    MessageError { error: String },
    /// `userId` is typing to this user.
    UserTyping(String),
    /// `userId` stopped typing to this user.
    UserStopTyping(String),
    /// Another user is ringing this user.
    #[serde(rename_all = "camelCase")]
    IncomingCall {
        caller_id: String,
        caller_display_name: String,
        meeting_code: String,
    },
    /// Current room roster, joiner included, in join order.
    RoomUsers(Vec<RoomMember>),
    /// A connection joined this user's room.
    #[serde(rename_all = "camelCase")]
    UserJoined {
        connection_id: ConnectionId,
        display_name: String,
    },
    /// A connection left this user's room.
    UserLeft(ConnectionId),
    /// Relayed SDP/ICE payload.
    #[serde(rename_all = "camelCase")]
    Signal {
        from_connection_id: ConnectionId,
        payload: Value,
    },
    /// A room chat line, live or replayed.
    #[serde(rename_all = "camelCase")]
    RoomChatMessage {
        text: String,
        sender_display_name: String,
        sender_connection_id: ConnectionId,
    },
}

/// Roster entry in `room-users`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RoomMember {
    pub id: ConnectionId,
    pub name: String,
}

impl ClientEvent {
    /// Bounded event name for metric labels and logs.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            ClientEvent::JoinCall(_) => "join-call",
            ClientEvent::Signal(_) => "signal",
            ClientEvent::RoomChatMessage(_) => "room-chat-message",
            ClientEvent::LeaveCall => "leave-call",
            ClientEvent::SendMessage(_) => "send-message",
            ClientEvent::Typing(_) => "typing",
            ClientEvent::StopTyping(_) => "stop-typing",
            ClientEvent::CallUser(_) => "call-user",
            ClientEvent::MarkRead(_) => "mark-read",
        }
    }
}

impl ServerEvent {
    /// Bounded event name for metric labels and logs.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            ServerEvent::OnlineUsers(_) => "online-users",
            ServerEvent::NewMessage(_) => "new-message",
            ServerEvent::MessageSent(_) => "message-sent",
            ServerEvent::MessageError { .. } => "message-error",
            ServerEvent::UserTyping(_) => "user-typing",
            ServerEvent::UserStopTyping(_) => "user-stop-typing",
            ServerEvent::IncomingCall { .. } => "incoming-call",
            ServerEvent::RoomUsers(_) => "room-users",
            ServerEvent::UserJoined { .. } => "user-joined",
            ServerEvent::UserLeft(_) => "user-left",
            ServerEvent::Signal { .. } => "signal",
            ServerEvent::RoomChatMessage { .. } => "room-chat-message",
        }
    }
}

/// Decode one inbound text frame.
///
/// # Errors
///
/// Returns the `serde_json` error for anything outside the vocabulary.
pub fn decode(frame: &str) -> Result<ClientEvent, serde_json::Error> {
    serde_json::from_str(frame)
}

/// Encode one outbound event as a text frame.
///
/// # Errors
///
/// Returns the `serde_json` error if serialization fails.
pub fn encode(event: &ServerEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}
