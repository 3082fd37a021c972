//! Mock message stores.
//!
//! - [`RecordingMessageStore`] accepts every write and counts calls
//! - [`FailingMessageStore`] rejects every write

use async_trait::async_trait;
use chrono::Utc;
use signaling_service::errors::StoreError;
use signaling_service::store::{Message, MessageStore, UserSummary};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// Stores messages in memory. Parties need not exist; unknown ids use the
/// id as display name.
#[derive(Debug, Default)]
pub struct RecordingMessageStore {
    names: HashMap<String, String>,
    messages: Mutex<Vec<Message>>,
    persist_calls: AtomicUsize,
}

impl RecordingMessageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_user(mut self, id: impl Into<String>, display_name: impl Into<String>) -> Self {
        self.names.insert(id.into(), display_name.into());
        self
    }

    pub fn persist_calls(&self) -> usize {
        self.persist_calls.load(Ordering::SeqCst)
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }

    fn summary(&self, id: &str) -> UserSummary {
        UserSummary {
            id: id.to_string(),
            display_name: self.names.get(id).cloned().unwrap_or_else(|| id.to_string()),
        }
    }
}

#[async_trait]
impl MessageStore for RecordingMessageStore {
    async fn persist(
        &self,
        sender_id: &str,
        receiver_id: &str,
        text: &str,
    ) -> Result<Message, StoreError> {
        self.persist_calls.fetch_add(1, Ordering::SeqCst);
        let message = Message {
            id: Uuid::new_v4().to_string(),
            sender: self.summary(sender_id),
            receiver: self.summary(receiver_id),
            text: text.to_string(),
            read: false,
            created_at: Utc::now(),
        };
        self.messages.lock().unwrap().push(message.clone());
        Ok(message)
    }

    async fn mark_read(&self, receiver_id: &str, sender_id: &str) -> Result<u64, StoreError> {
        let mut messages = self.messages.lock().unwrap();
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

/// Rejects every call with `StoreError::Unavailable`.
#[derive(Debug, Default)]
pub struct FailingMessageStore {
    calls: AtomicUsize,
}

impl FailingMessageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageStore for FailingMessageStore {
    async fn persist(&self, _: &str, _: &str, _: &str) -> Result<Message, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("mock store is down".to_string()))
    }

    async fn mark_read(&self, _: &str, _: &str) -> Result<u64, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("mock store is down".to_string()))
    }
}
