//! Metrics for the filter pipeline.
//!
//! Recorded through the `metrics` facade; the API binary installs the
//! Prometheus recorder. Without a recorder every call is a no-op.

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const TRANSFORMS_TOTAL: &str = "facefx_transforms_total";
    pub const TRANSFORM_DURATION_SECONDS: &str = "facefx_transform_duration_seconds";
    pub const TRANSFORM_FAILURES_TOTAL: &str = "facefx_transform_failures_total";

    pub const GATE_WAIT_SECONDS: &str = "facefx_gate_wait_seconds";
    pub const GATE_IN_FLIGHT: &str = "facefx_gate_in_flight";
    pub const GATE_REJECTIONS_TOTAL: &str = "facefx_gate_rejections_total";

    pub const ASSET_CACHE_TOTAL: &str = "facefx_asset_cache_total";
    pub const DETECTOR_DURATION_SECONDS: &str = "facefx_detector_duration_seconds";
}

/// Record a finished transform and the path it took.
pub fn record_transform(kind: &str, outcome: &str, duration_secs: f64) {
    let labels = [("kind", kind.to_string()), ("outcome", outcome.to_string())];
    counter!(names::TRANSFORMS_TOTAL, &labels).increment(1);
    histogram!(names::TRANSFORM_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a transform that failed with an error.
pub fn record_transform_failure(kind: &str, reason: &str) {
    let labels = [("kind", kind.to_string()), ("reason", reason.to_string())];
    counter!(names::TRANSFORM_FAILURES_TOTAL, &labels).increment(1);
}

/// Record time spent waiting for a gate slot.
pub fn record_gate_wait(duration_secs: f64) {
    histogram!(names::GATE_WAIT_SECONDS).record(duration_secs);
}

/// Set the number of heavy transforms holding a slot.
pub fn set_gate_in_flight(count: usize) {
    gauge!(names::GATE_IN_FLIGHT).set(count as f64);
}

/// Record a request turned away by the gate.
pub fn record_gate_rejection(reason: &'static str) {
    counter!(names::GATE_REJECTIONS_TOTAL, "reason" => reason).increment(1);
}

/// Record an asset cache lookup.
pub fn record_asset_lookup(result: &'static str) {
    counter!(names::ASSET_CACHE_TOTAL, "result" => result).increment(1);
}

/// Record one landmark detector invocation.
pub fn record_detector_call(duration_secs: f64) {
    histogram!(names::DETECTOR_DURATION_SECONDS).record(duration_secs);
}
