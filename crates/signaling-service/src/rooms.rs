//! Mesh room broker.
//!
//! Pure state, owned by the hub actor. Every operation returns the list of
//! [`Delivery`]s it produced, in the order they must be sent; the hub does
//! the sending. Rooms exist only while they have members. A connection is
//! in at most one room, tracked by a reverse index.

use crate::protocol::{RoomMember, ServerEvent};

use common::types::ConnectionId;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

/// One outbound event addressed to one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub to: ConnectionId,
    pub event: ServerEvent,
}

impl Delivery {
    #[must_use]
    pub fn new(to: ConnectionId, event: ServerEvent) -> Self {
        Self { to, event }
    }
}

#[derive(Debug, Clone)]
struct ChatEntry {
    sender_display_name: String,
    text: String,
    sender_connection_id: ConnectionId,
}

impl ChatEntry {
    fn to_event(&self) -> ServerEvent {
        ServerEvent::RoomChatMessage {
            text: self.text.clone(),
            sender_display_name: self.sender_display_name.clone(),
            sender_connection_id: self.sender_connection_id,
        }
    }
}

#[derive(Debug, Default)]
struct Room {
    /// Join order, no duplicates.
    members: Vec<ConnectionId>,
    names: HashMap<ConnectionId, String>,
    history: VecDeque<ChatEntry>,
}

impl Room {
    fn roster(&self) -> Vec<RoomMember> {
        self.members
            .iter()
            .map(|id| RoomMember {
                id: *id,
                name: self.names.get(id).cloned().unwrap_or_default(),
            })
            .collect()
    }
}

/// Point-in-time view of a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub room_code: String,
    pub members: Vec<RoomMember>,
    pub chat_history_len: usize,
}

#[derive(Debug)]
pub struct RoomBroker {
    rooms: HashMap<String, Room>,
    membership: HashMap<ConnectionId, String>,
    history_limit: usize,
}

impl RoomBroker {
    /// `history_limit` caps the chat entries kept per room; the oldest are
    /// dropped first. 0 keeps nothing.
    #[must_use]
    pub fn new(history_limit: usize) -> Self {
        Self {
            rooms: HashMap::new(),
            membership: HashMap::new(),
            history_limit,
        }
    }

    /// Add `connection_id` to `room_code`.
    ///
    /// Deliveries, in order: `room-users` to the joiner, `user-joined` to
    /// each other member in join order, then the chat backlog to the joiner.
    /// A connection already in a different room leaves it first, and those
    /// `user-left` deliveries come before everything else.
    pub fn join(
        &mut self,
        connection_id: ConnectionId,
        room_code: &str,
        display_name: &str,
    ) -> Vec<Delivery> {
        let switching = self
            .membership
            .get(&connection_id)
            .is_some_and(|current| current != room_code);
        let mut deliveries = if switching {
            self.leave(connection_id)
        } else {
            Vec::new()
        };

        let room = self.rooms.entry(room_code.to_string()).or_default();
        if !room.members.contains(&connection_id) {
            room.members.push(connection_id);
        }
        room.names.insert(connection_id, display_name.to_string());
        self.membership
            .insert(connection_id, room_code.to_string());

        deliveries.push(Delivery::new(
            connection_id,
            ServerEvent::RoomUsers(room.roster()),
        ));

        deliveries.extend(
            room.members
                .iter()
                .filter(|id| **id != connection_id)
                .map(|id| {
                    Delivery::new(
                        *id,
                        ServerEvent::UserJoined {
                            connection_id,
                            display_name: display_name.to_string(),
                        },
                    )
                }),
        );

        deliveries.extend(
            room.history
                .iter()
                .map(|entry| Delivery::new(connection_id, entry.to_event())),
        );

        deliveries
    }

    /// Forward `payload` to `to` as coming from `from`. No room check.
    #[must_use]
    pub fn signal(from: ConnectionId, to: ConnectionId, payload: Value) -> Delivery {
        Delivery::new(
            to,
            ServerEvent::Signal {
                from_connection_id: from,
                payload,
            },
        )
    }

    /// Post a chat line to the sender's room and fan it out to every member,
    /// sender included. Empty if the sender is in no room.
    ///
    /// Without `sender_display_name` the line carries the name the sender
    /// joined the room with.
    pub fn chat(
        &mut self,
        from: ConnectionId,
        text: &str,
        sender_display_name: Option<&str>,
    ) -> Vec<Delivery> {
        let Some(room) = self
            .membership
            .get(&from)
            .and_then(|code| self.rooms.get_mut(code))
        else {
            return Vec::new();
        };

        let sender_display_name = match sender_display_name {
            Some(name) => name.to_string(),
            None => room.names.get(&from).cloned().unwrap_or_default(),
        };
        let entry = ChatEntry {
            sender_display_name,
            text: text.to_string(),
            sender_connection_id: from,
        };
        let event = entry.to_event();

        if self.history_limit > 0 {
            room.history.push_back(entry);
            while room.history.len() > self.history_limit {
                room.history.pop_front();
            }
        }

        room.members
            .iter()
            .map(|id| Delivery::new(*id, event.clone()))
            .collect()
    }

    /// Remove `connection_id` from its room. `user-left` goes to every
    /// remaining member; an emptied room is deleted with its backlog.
    pub fn leave(&mut self, connection_id: ConnectionId) -> Vec<Delivery> {
        let Some(room_code) = self.membership.remove(&connection_id) else {
            return Vec::new();
        };
        let Some(room) = self.rooms.get_mut(&room_code) else {
            return Vec::new();
        };

        room.members.retain(|id| *id != connection_id);
        room.names.remove(&connection_id);

        let deliveries = room
            .members
            .iter()
            .map(|id| Delivery::new(*id, ServerEvent::UserLeft(connection_id)))
            .collect();

        if room.members.is_empty() {
            self.rooms.remove(&room_code);
        }

        deliveries
    }

    #[must_use]
    pub fn room_of(&self, connection_id: ConnectionId) -> Option<&str> {
        self.membership.get(&connection_id).map(String::as_str)
    }

    #[must_use]
    pub fn snapshot(&self, room_code: &str) -> Option<RoomSnapshot> {
        self.rooms.get(room_code).map(|room| RoomSnapshot {
            room_code: room_code.to_string(),
            members: room.roster(),
            chat_history_len: room.history.len(),
        })
    }

    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
