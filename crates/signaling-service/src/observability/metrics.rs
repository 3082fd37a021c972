//! Metric definitions for the signaling service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `signaling_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `event`: closed set of client event names (~11 values)
//! - `reason`: drop and auth failure reasons (4 values each)

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return the handle used to render
/// `/metrics`.
///
/// Must be called before any metric is recorded.
///
/// # Errors
///
/// Returns an error if a recorder is already installed.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Event handling includes a persistence round trip for send-message.
        .set_buckets_for_metric(
            Matcher::Prefix("signaling_message".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set message latency buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Gauges
// ============================================================================

/// Metric: `signaling_connections_active`
pub fn set_connections_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("signaling_connections_active").set(count as f64);
}

/// Metric: `signaling_online_users`
///
/// Users with at least one live connection.
pub fn set_online_users(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("signaling_online_users").set(count as f64);
}

/// Metric: `signaling_rooms_active`
pub fn set_rooms_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("signaling_rooms_active").set(count as f64);
}

// ============================================================================
// Counters
// ============================================================================

/// Record one inbound client event.
///
/// Metric: `signaling_events_total`
/// Labels: `event`
pub fn record_event(event: &'static str) {
    counter!("signaling_events_total", "event" => event).increment(1);
}

/// Record an outbound event that never reached its connection.
///
/// Metric: `signaling_events_dropped_total`
/// Labels: `reason` (`target_missing`, `mailbox_full`, `connection_closed`,
/// `transport_closed`)
pub fn record_event_dropped(reason: &'static str) {
    counter!("signaling_events_dropped_total", "reason" => reason).increment(1);
}

/// Metric: `signaling_persistence_failures_total`
/// Labels: `operation` (`persist`, `mark_read`)
pub fn record_persistence_failure(operation: &'static str) {
    counter!("signaling_persistence_failures_total", "operation" => operation).increment(1);
}

/// Metric: `signaling_auth_failures_total`
/// Labels: `reason` (see `AuthError::as_label`)
pub fn record_auth_failure(reason: &'static str) {
    counter!("signaling_auth_failures_total", "reason" => reason).increment(1);
}

/// Metric: `signaling_actor_panics_total`
/// Labels: `actor_type`
///
/// Any non-zero value is a bug.
pub fn record_actor_panic(actor_type: &'static str) {
    counter!("signaling_actor_panics_total", "actor_type" => actor_type).increment(1);
}

// ============================================================================
// Histograms
// ============================================================================

/// Time from frame decode to the last resulting delivery being queued.
///
/// Metric: `signaling_message_latency_seconds`
/// Labels: `event`
pub fn record_message_latency(event: &'static str, duration: Duration) {
    histogram!("signaling_message_latency_seconds", "event" => event)
        .record(duration.as_secs_f64());
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    #[test]
    fn test_recording_without_recorder_is_harmless() {
        set_connections_active(0);
        set_online_users(3);
        set_rooms_active(1);
        record_event("send-message");
        record_event_dropped("mailbox_full");
        record_persistence_failure("persist");
        record_auth_failure("expired");
        record_actor_panic("connection");
        record_message_latency("join-call", Duration::from_millis(2));
    }

    #[test]
    fn test_metric_names_and_labels() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            set_connections_active(4);
            record_event("typing");
            record_event("typing");
            record_event_dropped("target_missing");
            record_message_latency("typing", Duration::from_millis(1));
        });

        let metrics = snapshotter.snapshot().into_vec();

        let typing = metrics
            .iter()
            .find(|(key, _, _, _)| {
                key.key().name() == "signaling_events_total"
                    && key.key().labels().any(|l| l.value() == "typing")
            })
            .expect("events counter should be recorded");
        assert!(matches!(typing.3, DebugValue::Counter(2)));

        let names: Vec<_> = metrics
            .iter()
            .map(|(key, _, _, _)| key.key().name().to_string())
            .collect();
        for expected in [
            "signaling_connections_active",
            "signaling_events_dropped_total",
            "signaling_message_latency_seconds",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
    }
}
