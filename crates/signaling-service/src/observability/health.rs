//! Health endpoints, served on the health bind address next to `/metrics`.
//!
//! - `GET /health` - 200 while the process serves HTTP at all
//! - `GET /ready` - 200 with hub counters once listeners are bound and the
//!   hub answers; 503 before startup finishes, after shutdown begins, or
//!   when the hub has stopped

use crate::actors::SignalingHubHandle;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// How long `/ready` waits for the hub before reporting not ready.
const HUB_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

pub struct HealthState {
    ready: AtomicBool,
    hub: SignalingHubHandle,
}

impl HealthState {
    /// Starts not ready.
    #[must_use]
    pub fn new(hub: SignalingHubHandle) -> Self {
        Self {
            ready: AtomicBool::new(false),
            hub,
        }
    }

    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn set_not_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadyBody {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    connections: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    online_users: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rooms: Option<usize>,
}

impl ReadyBody {
    fn not_ready() -> Self {
        Self {
            status: "not_ready",
            connections: None,
            online_users: None,
            rooms: None,
        }
    }
}

pub fn health_router(health_state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(liveness))
        .route("/ready", get(readiness))
        .with_state(health_state)
}

async fn liveness() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

async fn readiness(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    if !state.is_ready() {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(ReadyBody::not_ready()));
    }

    match tokio::time::timeout(HUB_PROBE_TIMEOUT, state.hub.get_status()).await {
        Ok(Ok(status)) => (
            StatusCode::OK,
            Json(ReadyBody {
                status: "ready",
                connections: Some(status.connections),
                online_users: Some(status.online_users),
                rooms: Some(status.rooms),
            }),
        ),
        Ok(Err(e)) => {
            debug!(target: "signaling.health", error = %e, "Hub unavailable");
            (StatusCode::SERVICE_UNAVAILABLE, Json(ReadyBody::not_ready()))
        }
        Err(_) => {
            debug!(target: "signaling.health", "Hub status probe timed out");
            (StatusCode::SERVICE_UNAVAILABLE, Json(ReadyBody::not_ready()))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::ActorMetrics;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::util::ServiceExt;

    fn state() -> Arc<HealthState> {
        Arc::new(HealthState::new(SignalingHubHandle::new(
            10,
            ActorMetrics::new(),
        )))
    }

    async fn get(state: &Arc<HealthState>, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = health_router(Arc::clone(state))
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn test_liveness_always_ok() {
        let state = state();
        let (status, body) = get(&state, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_ready_reports_hub_counters() {
        let state = state();
        assert_eq!(get(&state, "/ready").await.0, StatusCode::SERVICE_UNAVAILABLE);

        state.set_ready();
        let (status, body) = get(&state, "/ready").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");
        assert_eq!(body["connections"], 0);
        assert_eq!(body["onlineUsers"], 0);
    }

    #[tokio::test]
    async fn test_not_ready_once_shutdown_starts() {
        let state = state();
        state.set_ready();
        state.set_not_ready();
        assert_eq!(get(&state, "/ready").await.0, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_not_ready_when_hub_stopped() {
        let state = state();
        state.set_ready();
        state.hub.cancel();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let (status, body) = get(&state, "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "not_ready");
    }

    #[tokio::test]
    async fn test_unknown_path_returns_404() {
        let state = state();
        assert_eq!(get(&state, "/unknown").await.0, StatusCode::NOT_FOUND);
    }
}
