//! Observability for the signaling service.
//!
//! # Privacy
//!
//! Actor loops and handlers use `#[instrument(skip_all)]` with explicit
//! fields. Message text and credentials are never logged; lengths are.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `signaling_connections_active` | Gauge | none | Registered connections |
//! | `signaling_online_users` | Gauge | none | Users with a live connection |
//! | `signaling_rooms_active` | Gauge | none | Non-empty rooms |
//! | `signaling_events_total` | Counter | `event` | Inbound client events |
//! | `signaling_events_dropped_total` | Counter | `reason` | Outbound events lost |
//! | `signaling_persistence_failures_total` | Counter | `operation` | Message store failures |
//! | `signaling_auth_failures_total` | Counter | `reason` | Refused connections |
//! | `signaling_actor_panics_total` | Counter | `actor_type` | Actor task panics |
//! | `signaling_message_latency_seconds` | Histogram | `event` | Event handling time |

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
pub use metrics::init_metrics_recorder;
