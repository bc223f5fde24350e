//! Central metrics registry and metric definitions
//!
//! In-process Prometheus instruments for the request gateway, the polling
//! engine and the churn driver. Metrics are registered lazily on first access
//! using once_cell::Lazy.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder, HistogramVec,
    IntCounterVec, IntGauge, TextEncoder,
};

// ===== Gateway Metrics =====

/// Total number of cluster API requests by action and outcome (`ok`/`failed`)
pub static REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "armada_perf_requests_total",
        "Total number of cluster API requests",
        &["action", "outcome"]
    )
    .expect("Failed to register request counter")
});

/// Response time of the final HTTP exchange for a request
pub static REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "armada_perf_request_duration_seconds",
        "Cluster API response time in seconds",
        &["action"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    )
    .expect("Failed to register request duration histogram")
});

// ===== Polling Metrics =====

/// Poll ticks by loop kind (`master`/`worker`)
pub static POLL_ITERATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "armada_perf_poll_iterations_total",
        "Total number of polling iterations",
        &["kind"]
    )
    .expect("Failed to register poll iteration counter")
});

// ===== Churn Metrics =====

/// Requests dispatched to the worker pool and not yet completed
pub static ACTIVE_REQUESTS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "armada_perf_active_requests",
        "Requests currently in the churn pipeline"
    )
    .expect("Failed to register active requests gauge")
});

/// Slots removed from service after repeated delete failures
pub static FROZEN_SLOTS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "armada_perf_frozen_slots",
        "Number of frozen churn slots"
    )
    .expect("Failed to register frozen slots gauge")
});

/// Slot state transitions
pub static CHURN_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "armada_perf_churn_transitions_total",
        "Total number of churn slot state transitions",
        &["from", "to"]
    )
    .expect("Failed to register churn transition counter")
});

/// Render every registered metric in the Prometheus text exposition format.
pub fn export_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %err, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
