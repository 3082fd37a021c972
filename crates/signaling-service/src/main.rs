//! Signaling Service
//!
//! Realtime presence, direct relay and mesh room signaling over WebSocket.
//!
//! # Servers
//!
//! - HTTP server for `/ws` and `/api/presence/contacts` (default: 0.0.0.0:3001)
//! - HTTP server for `/health`, `/ready` and `/metrics` (default: 0.0.0.0:8081)
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize tracing and the Prometheus recorder
//! 3. Build the user directory (optionally seeded) and message store
//! 4. Spawn the hub actor
//! 5. Bind both listeners, then start the health and signaling servers
//! 6. Wait for shutdown signal, then cancel the hub

#![warn(clippy::pedantic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use signaling_service::actors::{ActorMetrics, SignalingHubHandle};
use signaling_service::config::Config;
use signaling_service::directory::InMemoryUserDirectory;
use signaling_service::identity::{IdentityVerifier, JwtIdentityVerifier};
use signaling_service::observability::{health_router, init_metrics_recorder, HealthState};
use signaling_service::routes::{build_router, AppState};
use signaling_service::store::InMemoryMessageStore;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Time given to connections to flush after the hub is cancelled.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Configuration is loaded first so the log format can follow it.
    let config = Config::from_env();
    let log_json = config.as_ref().is_ok_and(|c| c.log_json);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "signaling_service=debug,tower_http=info".into());
    let (json_layer, text_layer) = if log_json {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer()))
    };
    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .init();

    info!("Starting Signaling Service");

    let config = config.map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        health_bind_address = %config.health_bind_address,
        room_chat_history_limit = config.room_chat_history_limit,
        connection_buffer = config.connection_buffer,
        user_seed = config.user_seed_path.is_some(),
        "Configuration loaded successfully"
    );

    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;
    info!("Prometheus metrics recorder initialized");

    let directory = match &config.user_seed_path {
        Some(path) => InMemoryUserDirectory::from_seed_file(path).await.map_err(|e| {
            error!(error = %e, "Failed to seed user directory");
            e
        })?,
        None => {
            warn!("No user seed configured, user directory starts empty");
            InMemoryUserDirectory::new()
        }
    };
    let directory = Arc::new(directory);

    let verifier: Arc<dyn IdentityVerifier> = Arc::new(JwtIdentityVerifier::new(
        config.jwt_secret.clone(),
        Arc::clone(&directory) as _,
    ));

    let actor_metrics = ActorMetrics::new();
    let hub = SignalingHubHandle::with_online_mirror(
        config.room_chat_history_limit,
        Arc::clone(&actor_metrics),
        Arc::clone(&verifier),
    );
    info!("Hub actor started");

    let health_state = Arc::new(HealthState::new(hub.clone()));

    let state = Arc::new(AppState {
        hub: hub.clone(),
        verifier,
        messages: Arc::new(InMemoryMessageStore::new(Arc::clone(&directory) as _)),
        contacts: Arc::clone(&directory) as _,
        actor_metrics,
        connection_buffer: config.connection_buffer,
    });

    let shutdown_token = hub.child_token();

    let metrics_router = Router::new().route(
        "/metrics",
        get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );
    let health_app = health_router(Arc::clone(&health_state)).merge(metrics_router);

    // Both listeners are bound before either server starts.
    let health_listener = bind("health", &config.health_bind_address).await?;
    let listener = bind("signaling", &config.bind_address).await?;

    spawn_server("health", health_listener, health_app, shutdown_token.child_token());
    spawn_server(
        "signaling",
        listener,
        build_router(state),
        shutdown_token.child_token(),
    );

    health_state.set_ready();
    info!("Signaling Service running - press Ctrl+C to shutdown");
    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");
    health_state.set_not_ready();

    // Cancelling the hub closes every connection and, through child
    // tokens, both servers.
    hub.cancel();
    tokio::time::sleep(SHUTDOWN_GRACE).await;

    info!("Signaling Service shutdown complete");
    Ok(())
}

async fn bind(name: &'static str, raw: &str) -> Result<TcpListener, String> {
    let addr: SocketAddr = raw.parse().map_err(|e| {
        error!(server = name, error = %e, addr = %raw, "Invalid bind address");
        format!("Invalid {name} bind address {raw}: {e}")
    })?;
    TcpListener::bind(addr).await.map_err(|e| {
        error!(server = name, error = %e, addr = %addr, "Failed to bind");
        format!("Failed to bind {name} server to {addr}: {e}")
    })
}

/// Serve `app` on `listener` until `shutdown` fires.
fn spawn_server(
    name: &'static str,
    listener: TcpListener,
    app: Router,
    shutdown: CancellationToken,
) {
    let addr = listener.local_addr().ok();
    tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            info!(server = name, "Server shutting down");
        });
        if let Err(e) = server.await {
            error!(server = name, error = %e, "Server failed");
        }
    });
    info!(server = name, addr = ?addr, "Server started");
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
