//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Frames**: raw frames received from and dropped by the feeds
//! - **Ticks**: decoded ticks dispatched and pushes delivered/dropped
//! - **Sessions**: live session and bus subscription gauges
//!
//! Counters and gauges are recorded at the point of occurrence through
//! the `metrics` facade; this module installs the recorder and
//! describes every metric name used in the crate.

use std::sync::OnceLock;

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Frame counters
    describe_counter!(
        "stream_hub_frames_received_total",
        "Raw frames received from upstream feeds"
    );
    describe_counter!(
        "stream_hub_frames_dropped_total",
        "Raw frames dropped because the ingestion queue was full"
    );

    // Tick counters
    describe_counter!(
        "stream_hub_ticks_dispatched_total",
        "Decoded ticks fanned out to sessions"
    );
    describe_counter!(
        "stream_hub_pushes_total",
        "Valuation pushes enqueued to session outbound queues"
    );
    describe_counter!(
        "stream_hub_pushes_dropped_total",
        "Valuation pushes dropped because a session queue was full"
    );
    describe_counter!(
        "stream_hub_bus_messages_dropped_total",
        "Bus messages dropped because the inbound queue was full"
    );

    // Gauges
    describe_gauge!("stream_hub_live_sessions", "Live per-user sessions");
    describe_gauge!(
        "stream_hub_bus_subscriptions",
        "Topics with an active bus subscription"
    );
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_absent_before_init() {
        // Other tests may have initialized the recorder already; this
        // only checks that the accessor never panics.
        let _ = get_metrics_handle();
    }
}
