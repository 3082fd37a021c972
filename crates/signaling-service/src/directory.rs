//! User directory: the user records identity verification resolves against.
//!
//! Production deployments put a real user service behind [`UserDirectory`].
//! [`InMemoryUserDirectory`] backs development and tests, optionally seeded
//! from a JSON file:
//!
//! ```json
//! [
//!   {"id": "u-1", "displayName": "Ann", "contacts": ["u-2"]},
//!   {"id": "u-2", "displayName": "Bo", "contacts": ["u-1"]}
//! ]
//! ```

use crate::errors::StoreError;
use crate::store::{ContactStore, UserSummary};

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::info;

/// A user as the directory stores it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub contacts: Vec<String>,
}

impl UserRecord {
    #[must_use]
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            online: false,
            contacts: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_contacts<I, S>(mut self, contacts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.contacts = contacts.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

/// Lookup and online-flag persistence for user records.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn set_online(&self, user_id: &str, online: bool) -> Result<(), StoreError>;
}

/// Process-local user directory.
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<String, UserRecord>>,
}

impl InMemoryUserDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_records(records: impl IntoIterator<Item = UserRecord>) -> Self {
        let users = records.into_iter().map(|u| (u.id.clone(), u)).collect();
        Self {
            users: RwLock::new(users),
        }
    }

    /// Load records from a JSON seed file.
    ///
    /// # Errors
    ///
    /// `StoreError::Unavailable` if the file can't be read or parsed.
    pub async fn from_seed_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StoreError::Unavailable(format!("read {}: {e}", path.display())))?;
        let records: Vec<UserRecord> = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Unavailable(format!("parse {}: {e}", path.display())))?;

        info!(
            target: "signaling.directory",
            users = records.len(),
            "User directory seeded"
        );

        Ok(Self::from_records(records))
    }

    pub async fn insert(&self, record: UserRecord) {
        self.users.write().await.insert(record.id.clone(), record);
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.users.read().await.get(user_id).cloned())
    }

    async fn set_online(&self, user_id: &str, online: bool) -> Result<(), StoreError> {
        match self.users.write().await.get_mut(user_id) {
            Some(user) => {
                user.online = online;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("user {user_id}"))),
        }
    }
}

#[async_trait]
impl ContactStore for InMemoryUserDirectory {
    /// Contacts sorted by display name. Dangling contact ids are skipped.
    async fn contacts_of(&self, user_id: &str) -> Result<Vec<UserSummary>, StoreError> {
        let users = self.users.read().await;
        let user = users
            .get(user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?;

        let mut contacts: Vec<UserSummary> = user
            .contacts
            .iter()
            .filter_map(|id| users.get(id))
            .map(UserRecord::summary)
            .collect();
        contacts.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(contacts)
    }
}
