//! HTTP routes for the signaling service.
//!
//! - `GET /ws?token=<credential>` - WebSocket upgrade
//! - `GET /api/presence/contacts` - caller's contacts with live presence
//!   (`Authorization: Bearer <credential>`)
//!
//! Health and metrics are served from a separate router on their own
//! bind address.

use crate::actors::{ActorMetrics, SignalingHubHandle};
use crate::errors::{AuthError, SignalingError};
use crate::identity::{Identity, IdentityVerifier};
use crate::observability::metrics as prom;
use crate::presence::{contacts_with_presence, ContactPresence};
use crate::store::{ContactStore, MessageStore};
use crate::transport::ws::ws_upgrade;

use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    routing::get,
    Extension, Json, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, instrument};

/// Shared state for every handler and session.
#[derive(Clone)]
pub struct AppState {
    pub hub: SignalingHubHandle,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub messages: Arc<dyn MessageStore>,
    pub contacts: Arc<dyn ContactStore>,
    pub actor_metrics: Arc<ActorMetrics>,
    /// Outbound mailbox size per connection.
    pub connection_buffer: usize,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/api/presence/contacts", get(get_contacts))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_identity,
        ));

    Router::new()
        .route("/ws", get(ws_upgrade))
        .merge(api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Resolve the bearer credential to an [`Identity`] and store it in the
/// request extensions. 401 on any failure.
#[instrument(skip_all, name = "signaling.middleware.auth")]
async fn require_identity(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, SignalingError> {
    let token = req
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| {
            debug!(target: "signaling.middleware.auth", "Missing or malformed Authorization header");
            prom::record_auth_failure(AuthError::MissingCredential.as_label());
            SignalingError::Auth(AuthError::MissingCredential)
        })?;

    let identity = state.verifier.verify(token).await.map_err(|e| {
        prom::record_auth_failure(e.as_label());
        SignalingError::Auth(e)
    })?;

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Handler for `GET /api/presence/contacts`.
#[instrument(skip_all, name = "signaling.handlers.contacts")]
async fn get_contacts(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<ContactPresence>>, SignalingError> {
    let contacts =
        contacts_with_presence(&state.hub, state.contacts.as_ref(), &identity.user_id).await?;
    debug!(
        target: "signaling.handlers.contacts",
        contacts = contacts.len(),
        "Returning contacts"
    );
    Ok(Json(contacts))
}
