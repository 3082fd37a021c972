//! Message and contact persistence seams.
//!
//! Direct messages are stored through [`MessageStore`] before any delivery.
//! The store returns the message populated with sender and receiver
//! summaries, which is exactly what `new-message` and `message-sent` carry.

use crate::directory::UserDirectory;
use crate::errors::StoreError;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Public view of a user attached to messages and contact lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub display_name: String,
}

/// A stored direct message, populated with both parties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender: UserSummary,
    pub receiver: UserSummary,
    pub text: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Store `text` from `sender_id` to `receiver_id`, unread.
    async fn persist(
        &self,
        sender_id: &str,
        receiver_id: &str,
        text: &str,
    ) -> Result<Message, StoreError>;

    /// Mark every message from `sender_id` to `receiver_id` read. Returns
    /// how many changed.
    async fn mark_read(&self, receiver_id: &str, sender_id: &str) -> Result<u64, StoreError>;
}

/// The contacts visible to a user.
#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn contacts_of(&self, user_id: &str) -> Result<Vec<UserSummary>, StoreError>;
}

/// Process-local message store that resolves parties through a directory.
pub struct InMemoryMessageStore {
    directory: Arc<dyn UserDirectory>,
    messages: RwLock<Vec<Message>>,
}

impl InMemoryMessageStore {
    #[must_use]
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self {
            directory,
            messages: RwLock::new(Vec::new()),
        }
    }

    /// Messages exchanged between two users, oldest first.
    pub async fn conversation(&self, a: &str, b: &str) -> Vec<Message> {
        self.messages
            .read()
            .await
            .iter()
            .filter(|m| {
                (m.sender.id == a && m.receiver.id == b) || (m.sender.id == b && m.receiver.id == a)
            })
            .cloned()
            .collect()
    }

    async fn summary_of(&self, user_id: &str) -> Result<UserSummary, StoreError> {
        self.directory
            .find_user(user_id)
            .await?
            .map(|u| u.summary())
            .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn persist(
        &self,
        sender_id: &str,
        receiver_id: &str,
        text: &str,
    ) -> Result<Message, StoreError> {
        let sender = self.summary_of(sender_id).await?;
        let receiver = self.summary_of(receiver_id).await?;

        let message = Message {
            id: uuid::Uuid::new_v4().to_string(),
            sender,
            receiver,
            text: text.to_string(),
            read: false,
            created_at: Utc::now(),
        };

        self.messages.write().await.push(message.clone());
        Ok(message)
    }

    async fn mark_read(&self, receiver_id: &str, sender_id: &str) -> Result<u64, StoreError> {
        let mut messages = self.messages.write().await;
        let mut changed = 0;
        for m in messages
            .iter_mut()
            .filter(|m| !m.read && m.sender.id == sender_id && m.receiver.id == receiver_id)
        {
            m.read = true;
            changed += 1;
        }
        Ok(changed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::directory::{InMemoryUserDirectory, UserRecord};

    fn store() -> InMemoryMessageStore {
        let directory = Arc::new(InMemoryUserDirectory::from_records([
            UserRecord::new("u-1", "Ann"),
            UserRecord::new("u-2", "Bo"),
        ]));
        InMemoryMessageStore::new(directory)
    }

    #[tokio::test]
    async fn test_persist_populates_parties() {
        let store = store();
        let message = store.persist("u-1", "u-2", "hi").await.unwrap();

        assert_eq!(message.sender.display_name, "Ann");
        assert_eq!(message.receiver.display_name, "Bo");
        assert_eq!(message.text, "hi");
        assert!(!message.read);
        assert_eq!(store.conversation("u-2", "u-1").await, vec![message]);
    }

    #[tokio::test]
    async fn test_persist_unknown_receiver_fails() {
        let store = store();
        assert!(matches!(
            store.persist("u-1", "u-9", "hi").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(store.conversation("u-1", "u-9").await.is_empty());
    }

    #[tokio::test]
    async fn test_mark_read_only_touches_one_direction() {
        let store = store();
        store.persist("u-1", "u-2", "one").await.unwrap();
        store.persist("u-1", "u-2", "two").await.unwrap();
        store.persist("u-2", "u-1", "back").await.unwrap();

        assert_eq!(store.mark_read("u-2", "u-1").await.unwrap(), 2);
        assert_eq!(store.mark_read("u-2", "u-1").await.unwrap(), 0);

        let convo = store.conversation("u-1", "u-2").await;
        let unread: Vec<_> = convo.iter().filter(|m| !m.read).map(|m| m.text.as_str()).collect();
        assert_eq!(unread, vec!["back"]);
    }

    #[test]
    fn test_message_serializes_camel_case() {
        let message = Message {
            id: "m-1".to_string(),
            sender: UserSummary {
                id: "u-1".to_string(),
                display_name: "Ann".to_string(),
            },
            receiver: UserSummary {
                id: "u-2".to_string(),
                display_name: "Bo".to_string(),
            },
            text: "hi".to_string(),
            read: false,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["sender"]["displayName"], "Ann");
        assert!(json.get("createdAt").is_some());
    }
}
