//! Contact lists annotated with live presence.
//!
//! The `online` flag comes from the hub's online set, never from the
//! stored user record, so it can't lag behind a disconnect.

use crate::actors::SignalingHubHandle;
use crate::errors::SignalingError;
use crate::store::{ContactStore, UserSummary};

use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactPresence {
    pub id: String,
    pub display_name: String,
    pub online: bool,
}

/// Tag each contact with its online state. Online contacts first, then by
/// display name.
#[must_use]
pub fn with_presence(contacts: Vec<UserSummary>, online: &[String]) -> Vec<ContactPresence> {
    let online: HashSet<&str> = online.iter().map(String::as_str).collect();

    let mut annotated: Vec<ContactPresence> = contacts
        .into_iter()
        .map(|c| ContactPresence {
            online: online.contains(c.id.as_str()),
            id: c.id,
            display_name: c.display_name,
        })
        .collect();

    annotated.sort_by(|a, b| {
        b.online
            .cmp(&a.online)
            .then_with(|| a.display_name.cmp(&b.display_name))
    });
    annotated
}

/// Contacts of `user_id` with live presence.
///
/// # Errors
///
/// `Persistence` if the contact store fails, `Channel` if the hub is gone.
pub async fn contacts_with_presence(
    hub: &SignalingHubHandle,
    contacts: &dyn ContactStore,
    user_id: &str,
) -> Result<Vec<ContactPresence>, SignalingError> {
    let contacts = contacts.contacts_of(user_id).await?;
    let online = hub.online_users().await?;
    Ok(with_presence(contacts, &online))
}
