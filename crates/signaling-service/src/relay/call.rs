//! Call invitation relay.

use crate::actors::SignalingHubHandle;
use crate::errors::SignalingError;
use crate::identity::Identity;
use crate::protocol::{CallUserRequest, ServerEvent};

use tracing::debug;

/// Ring `request.receiver_id` on every live connection.
///
/// Returns how many connections were rung; an offline or empty receiver
/// is 0 and nothing is sent back to the caller.
pub async fn call_user(
    hub: &SignalingHubHandle,
    caller: &Identity,
    request: CallUserRequest,
) -> Result<usize, SignalingError> {
    if request.receiver_id.is_empty() {
        return Ok(0);
    }

    let rung = hub
        .deliver_to_user(
            &request.receiver_id,
            ServerEvent::IncomingCall {
                caller_id: caller.user_id.clone(),
                caller_display_name: caller.display_name.clone(),
                meeting_code: request.meeting_code,
            },
        )
        .await?;

    debug!(
        target: "signaling.relay",
        caller_id = %caller.user_id,
        connections = rung,
        "Call invitation relayed"
    );
    Ok(rung)
}
