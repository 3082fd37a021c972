//! WebSocket transport.
//!
//! `GET /ws?token=<credential>`. The credential is verified before the
//! upgrade completes. On failure the socket is upgraded and immediately
//! closed with:
//!
//! | Code | Meaning |
//! |------|---------|
//! | 4001 | credential expired |
//! | 4002 | credential missing, invalid, or names no user |
//!
//! On success the socket is split: the write half goes to the session's
//! connection actor, the read half is drained here one frame at a time.

use crate::errors::AuthError;
use crate::identity::Identity;
use crate::observability::metrics as prom;
use crate::protocol::{self, ServerEvent};
use crate::routes::AppState;
use crate::session::Session;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{future, SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    #[serde(default)]
    pub token: String,
}

/// Handler for `GET /ws`.
pub async fn ws_upgrade(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let verified = if params.token.is_empty() {
        Err(AuthError::MissingCredential)
    } else {
        state.verifier.verify(&params.token).await
    };

    match verified {
        Ok(identity) => {
            debug!(
                target: "signaling.ws",
                user_id = %identity.user_id,
                "WebSocket connection authenticated"
            );
            ws.on_upgrade(move |socket| handle_authenticated(socket, state, identity))
        }
        Err(err) => {
            prom::record_auth_failure(err.as_label());
            warn!(
                target: "signaling.ws",
                close_code = err.close_code(),
                reason = err.as_label(),
                "WebSocket auth failed"
            );

            ws.on_upgrade(move |mut socket| async move {
                let close_frame = CloseFrame {
                    code: err.close_code(),
                    reason: err.client_message().into(),
                };
                let _ = socket.send(Message::Close(Some(close_frame))).await;
            })
        }
    }
}

async fn handle_authenticated(socket: WebSocket, state: Arc<AppState>, identity: Identity) {
    let (sink, mut stream) = socket.split();
    let sink = sink.with(|event: ServerEvent| {
        future::ready(
            protocol::encode(&event)
                .map(Message::Text)
                .map_err(axum::Error::new),
        )
    });

    let shutdown = state.hub.child_token();
    let session = match Session::open(Arc::clone(&state), identity, sink).await {
        Ok(session) => session,
        Err(e) => {
            warn!(target: "signaling.ws", error = %e, "Failed to open session");
            return;
        }
    };

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,

            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => session.handle_frame(&text).await,
                    Some(Ok(Message::Close(_))) | None => break,
                    // Pings are answered by axum; binary frames are not part of the protocol.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(
                            target: "signaling.ws",
                            connection_id = %session.connection_id(),
                            error = %e,
                            "WebSocket read failed"
                        );
                        break;
                    }
                }
            }
        }
    }

    info!(
        target: "signaling.ws",
        connection_id = %session.connection_id(),
        "WebSocket closed"
    );
    session.close().await;
}
