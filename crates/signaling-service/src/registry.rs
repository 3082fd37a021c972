//! Connection registry and the online set derived from it.
//!
//! Pure state, owned by the hub actor. A user is online while at least one
//! of its connections is registered; the online set is never stored
//! separately from the connections that justify it.

use crate::identity::Identity;

use common::types::ConnectionId;
use std::collections::{BTreeMap, HashMap};

/// Result of removing a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removed {
    pub identity: Identity,
    /// This was the user's last live connection.
    pub went_offline: bool,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Identity>,
    online: BTreeMap<String, Vec<ConnectionId>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `connection_id` for `identity`.
    ///
    /// Returns `true` if this is the user's first live connection.
    /// Re-admitting an already registered connection changes nothing.
    pub fn admit(&mut self, connection_id: ConnectionId, identity: Identity) -> bool {
        if self.connections.contains_key(&connection_id) {
            return false;
        }

        let slots = self.online.entry(identity.user_id.clone()).or_default();
        let came_online = slots.is_empty();
        slots.push(connection_id);
        self.connections.insert(connection_id, identity);
        came_online
    }

    /// Unregister `connection_id`. `None` if it was never admitted.
    pub fn remove(&mut self, connection_id: ConnectionId) -> Option<Removed> {
        let identity = self.connections.remove(&connection_id)?;

        let went_offline = match self.online.get_mut(&identity.user_id) {
            Some(slots) => {
                slots.retain(|c| *c != connection_id);
                slots.is_empty()
            }
            None => true,
        };
        if went_offline {
            self.online.remove(&identity.user_id);
        }

        Some(Removed {
            identity,
            went_offline,
        })
    }

    #[must_use]
    pub fn identity(&self, connection_id: ConnectionId) -> Option<&Identity> {
        self.connections.get(&connection_id)
    }

    /// Live connections of `user_id`, oldest first.
    #[must_use]
    pub fn connections_of(&self, user_id: &str) -> &[ConnectionId] {
        self.online.get(user_id).map_or(&[][..], Vec::as_slice)
    }

    #[must_use]
    pub fn is_online(&self, user_id: &str) -> bool {
        self.online.contains_key(user_id)
    }

    /// Online user ids in sorted order.
    #[must_use]
    pub fn online_users(&self) -> Vec<String> {
        self.online.keys().cloned().collect()
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn online_count(&self) -> usize {
        self.online.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn ann() -> Identity {
        Identity::new("u-1", "Ann")
    }

    fn bo() -> Identity {
        Identity::new("u-2", "Bo")
    }

    #[test]
    fn test_admit_and_remove_single_connection() {
        let mut reg = ConnectionRegistry::new();
        let c1 = ConnectionId::new();

        assert!(reg.admit(c1, ann()));
        assert!(reg.is_online("u-1"));
        assert_eq!(reg.online_users(), vec!["u-1".to_string()]);
        assert_eq!(reg.identity(c1), Some(&ann()));

        let removed = reg.remove(c1).unwrap();
        assert!(removed.went_offline);
        assert_eq!(removed.identity, ann());
        assert!(!reg.is_online("u-1"));
        assert!(reg.online_users().is_empty());
        assert_eq!(reg.connection_count(), 0);
    }

    #[test]
    fn test_user_stays_online_until_last_connection_closes() {
        let mut reg = ConnectionRegistry::new();
        let tab1 = ConnectionId::new();
        let tab2 = ConnectionId::new();

        assert!(reg.admit(tab1, ann()));
        assert!(!reg.admit(tab2, ann()));
        assert_eq!(reg.connections_of("u-1"), &[tab1, tab2]);
        assert_eq!(reg.online_count(), 1);

        assert!(!reg.remove(tab1).unwrap().went_offline);
        assert!(reg.is_online("u-1"));
        assert_eq!(reg.connections_of("u-1"), &[tab2]);

        assert!(reg.remove(tab2).unwrap().went_offline);
        assert!(!reg.is_online("u-1"));
        assert!(reg.connections_of("u-1").is_empty());
    }

    #[test]
    fn test_online_set_matches_live_connections() {
        let mut reg = ConnectionRegistry::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();

        reg.admit(b, bo());
        reg.admit(a, ann());
        assert_eq!(reg.online_users(), vec!["u-1".to_string(), "u-2".to_string()]);

        reg.remove(a);
        assert_eq!(reg.online_users(), vec!["u-2".to_string()]);
        assert_eq!(reg.connection_count(), 1);
        assert_eq!(reg.connections_of("u-2"), &[b]);
    }

    #[test]
    fn test_duplicate_admit_and_unknown_remove_are_noops() {
        let mut reg = ConnectionRegistry::new();
        let c1 = ConnectionId::new();

        assert!(reg.admit(c1, ann()));
        assert!(!reg.admit(c1, ann()));
        assert_eq!(reg.connections_of("u-1").len(), 1);

        assert!(reg.remove(ConnectionId::new()).is_none());
        assert_eq!(reg.connection_count(), 1);
    }
}
