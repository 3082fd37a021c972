//! Direct message relay: sender -> receiver chat, typing indicators and
//! read receipts.
//!
//! A message is persisted exactly once before anything is delivered. The
//! receiver gets `new-message` on every live connection; the sending
//! connection gets `message-sent` whether or not the receiver is online.

use crate::actors::SignalingHubHandle;
use crate::errors::SignalingError;
use crate::identity::Identity;
use crate::observability::metrics as prom;
use crate::protocol::{SendMessageRequest, ServerEvent};
use crate::store::MessageStore;

use common::types::ConnectionId;
use tracing::{debug, instrument, warn};

/// Client message for a failed read receipt.
const MARK_READ_FAILED: &str = "Failed to mark messages read";

/// What happened to a `send-message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectOutcome {
    /// Empty receiver or blank text; nothing stored.
    Ignored,
    /// Stored and queued on `connections` receiver connections.
    Delivered { connections: usize },
    /// Stored; receiver offline.
    Stored,
    /// Store rejected the message; `message-error` sent to the sender.
    Failed,
}

/// Persist and relay one direct message from `sender` on `from`.
///
/// # Errors
///
/// Only hub channel failures; store failures are reported to the sender.
#[instrument(
    skip_all,
    name = "signaling.relay.send_message",
    fields(connection_id = %from, sender_id = %sender.user_id)
)]
pub async fn send_message(
    hub: &SignalingHubHandle,
    store: &dyn MessageStore,
    from: ConnectionId,
    sender: &Identity,
    request: SendMessageRequest,
) -> Result<DirectOutcome, SignalingError> {
    let text = request.text.trim();
    if request.receiver_id.is_empty() || text.is_empty() {
        debug!(target: "signaling.relay", "Ignoring send-message with empty receiver or text");
        return Ok(DirectOutcome::Ignored);
    }

    let message = match store.persist(&sender.user_id, &request.receiver_id, text).await {
        Ok(message) => message,
        Err(e) => {
            let err = SignalingError::from(e);
            warn!(
                target: "signaling.relay",
                error = %err,
                text_len = text.len(),
                "Failed to persist direct message"
            );
            prom::record_persistence_failure("persist");
            hub.deliver_to_connection(
                from,
                ServerEvent::MessageError {
                    error: err.client_message(),
                },
            )
            .await?;
            return Ok(DirectOutcome::Failed);
        }
    };

    let connections = hub
        .deliver_to_user(&request.receiver_id, ServerEvent::NewMessage(message.clone()))
        .await?;
    hub.deliver_to_connection(from, ServerEvent::MessageSent(message))
        .await?;

    debug!(
        target: "signaling.relay",
        receiver_connections = connections,
        text_len = text.len(),
        "Direct message relayed"
    );

    Ok(if connections > 0 {
        DirectOutcome::Delivered { connections }
    } else {
        DirectOutcome::Stored
    })
}

/// Forward a typing indicator. Returns how many connections got it.
pub async fn typing(
    hub: &SignalingHubHandle,
    sender: &Identity,
    receiver_id: &str,
) -> Result<usize, SignalingError> {
    if receiver_id.is_empty() {
        return Ok(0);
    }
    hub.deliver_to_user(receiver_id, ServerEvent::UserTyping(sender.user_id.clone()))
        .await
}

pub async fn stop_typing(
    hub: &SignalingHubHandle,
    sender: &Identity,
    receiver_id: &str,
) -> Result<usize, SignalingError> {
    if receiver_id.is_empty() {
        return Ok(0);
    }
    hub.deliver_to_user(
        receiver_id,
        ServerEvent::UserStopTyping(sender.user_id.clone()),
    )
    .await
}

/// Mark every message from `sender_id` to `reader` as read.
///
/// Returns how many messages changed; a store failure is reported to the
/// reader's connection and counts as 0.
#[instrument(
    skip_all,
    name = "signaling.relay.mark_read",
    fields(connection_id = %from, reader_id = %reader.user_id)
)]
pub async fn mark_read(
    hub: &SignalingHubHandle,
    store: &dyn MessageStore,
    from: ConnectionId,
    reader: &Identity,
    sender_id: &str,
) -> Result<u64, SignalingError> {
    if sender_id.is_empty() {
        return Ok(0);
    }

    match store.mark_read(&reader.user_id, sender_id).await {
        Ok(changed) => Ok(changed),
        Err(e) => {
            warn!(target: "signaling.relay", error = %e, "Failed to mark messages read");
            prom::record_persistence_failure("mark_read");
            hub.deliver_to_connection(
                from,
                ServerEvent::MessageError {
                    error: MARK_READ_FAILED.to_string(),
                },
            )
            .await?;
            Ok(0)
        }
    }
}
