//! Pipeline metrics.
//!
//! Counters and histograms for the moment pipeline:
//! - Captures taken and skipped
//! - Classifier dispatches and failures
//! - Compositions by outcome and overlay kind
//! - Cache and artifact evictions

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

// =============================================================================
// Metric Names
// =============================================================================

/// Metric name constants for consistency.
pub mod names {
    pub const CAPTURES_TOTAL: &str = "emocap_captures_total";
    pub const CAPTURES_SKIPPED_TOTAL: &str = "emocap_captures_skipped_total";

    pub const ANALYSIS_DISPATCHES_TOTAL: &str = "emocap_analysis_dispatches_total";
    pub const CLASSIFIER_FAILURES_TOTAL: &str = "emocap_classifier_failures_total";
    pub const DETECTOR_FAILURES_TOTAL: &str = "emocap_detector_failures_total";
    pub const CLASSIFICATION_SECONDS: &str = "emocap_classification_seconds";

    pub const COMPOSITIONS_TOTAL: &str = "emocap_compositions_total";
    pub const COMPOSITION_SECONDS: &str = "emocap_composition_seconds";

    pub const COMMENTARY_TOTAL: &str = "emocap_commentary_total";

    pub const IDENTITIES_EVICTED_TOTAL: &str = "emocap_identities_evicted_total";
    pub const TRACKED_IDENTITIES: &str = "emocap_tracked_identities";

    pub const ARTIFACTS_DELETED_TOTAL: &str = "emocap_artifacts_deleted_total";
    pub const ARTIFACT_BYTES_FREED_TOTAL: &str = "emocap_artifact_bytes_freed_total";
}

/// Install the Prometheus exporter listening on `addr`.
pub fn install_exporter(addr: SocketAddr) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {}", e)))
}

// =============================================================================
// Recording Functions
// =============================================================================

pub fn record_capture(label: &str) {
    counter!(names::CAPTURES_TOTAL, "emotion" => label.to_string()).increment(1);
}

/// `reason` is one of `no_candidate`, `invalid_geometry`, `io`.
pub fn record_capture_skipped(reason: &str) {
    counter!(names::CAPTURES_SKIPPED_TOTAL, "reason" => reason.to_string()).increment(1);
}

pub fn record_dispatch() {
    counter!(names::ANALYSIS_DISPATCHES_TOTAL).increment(1);
}

pub fn record_classification(latency_secs: f64, success: bool) {
    histogram!(names::CLASSIFICATION_SECONDS).record(latency_secs);
    if !success {
        counter!(names::CLASSIFIER_FAILURES_TOTAL).increment(1);
    }
}

pub fn record_detector_failure() {
    counter!(names::DETECTOR_FAILURES_TOTAL).increment(1);
}

pub fn record_composition(success: bool, overlay: Option<&str>, latency_secs: f64) {
    let status = if success { "success" } else { "failed" };
    counter!(
        names::COMPOSITIONS_TOTAL,
        "status" => status,
        "overlay" => overlay.unwrap_or("none").to_string()
    )
    .increment(1);
    histogram!(names::COMPOSITION_SECONDS).record(latency_secs);
}

/// `status` is one of `produced`, `empty`, `failed`.
pub fn record_commentary(status: &str) {
    counter!(names::COMMENTARY_TOTAL, "status" => status.to_string()).increment(1);
}

/// `reason` is `ttl` or `cap`.
pub fn record_evictions(reason: &str, count: usize) {
    if count > 0 {
        counter!(names::IDENTITIES_EVICTED_TOTAL, "reason" => reason.to_string())
            .increment(count as u64);
    }
}

pub fn set_tracked_identities(count: usize) {
    gauge!(names::TRACKED_IDENTITIES).set(count as f64);
}

pub fn record_artifacts_deleted(dir: &str, files: usize, bytes: u64) {
    if files > 0 {
        counter!(names::ARTIFACTS_DELETED_TOTAL, "dir" => dir.to_string()).increment(files as u64);
        counter!(names::ARTIFACT_BYTES_FREED_TOTAL, "dir" => dir.to_string()).increment(bytes);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::CAPTURES_TOTAL.starts_with("emocap_"));
        assert!(names::CAPTURES_SKIPPED_TOTAL.contains("skipped"));
        assert!(names::COMPOSITION_SECONDS.ends_with("_seconds"));
        assert!(names::IDENTITIES_EVICTED_TOTAL.contains("evicted"));
    }

    #[test]
    fn test_recording_without_recorder() {
        record_capture("happy");
        record_capture_skipped("no_candidate");
        record_composition(true, Some("special"), 0.2);
        record_evictions("ttl", 0);
        record_artifacts_deleted("pictures", 2, 1024);
    }
}
