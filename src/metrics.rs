// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the address controller.
//!
//! All metrics share the namespace prefix `address_controller_`.
//!
//! # Metrics Categories
//!
//! - **Reconciliation Metrics** - Handled watch events per scope and their outcomes
//! - **Cluster Lifecycle Metrics** - Destination-cluster bundles created and torn down
//! - **Record Metrics** - Malformed address entries skipped while grouping
//! - **Watch Metrics** - Subscriptions re-established after a failure
//! - **Error Metrics** - Errors by scope and kind
//!
//! # Example
//!
//! ```rust,no_run
//! use address_controller::metrics::record_reconciliation_success;
//!
//! record_reconciliation_success("destination", std::time::Duration::from_millis(40));
//! ```

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::LazyLock;
use std::time::Duration;

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all controller metrics
const METRICS_NAMESPACE: &str = "address_controller";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
///
/// All metrics are registered in this registry and exposed via `/metrics` endpoint.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Total number of handled events by scope and status
///
/// Labels:
/// - `scope`: Which loop handled the event (`instance`, `destination`)
/// - `status`: Outcome (`success`, `error`)
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of reconciliations by scope and status",
    );
    let counter = CounterVec::new(opts, &["scope", "status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of reconciliations in seconds
///
/// Labels:
/// - `scope`: Which loop handled the event
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of reconciliations in seconds by scope",
    )
    .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]);
    let histogram = HistogramVec::new(opts, &["scope"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// Cluster Lifecycle Metrics
// ============================================================================

/// Total number of destination-cluster bundles created
///
/// Labels:
/// - `template`: Template the bundle was rendered from
pub static CLUSTERS_CREATED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_clusters_created_total"),
        "Total number of destination-cluster bundles created by template",
    );
    let counter = CounterVec::new(opts, &["template"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total number of destination-cluster bundles torn down
///
/// Labels:
/// - `namespace`: Instance namespace of the bundle
pub static CLUSTERS_DELETED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_clusters_deleted_total"),
        "Total number of destination-cluster bundles torn down by namespace",
    );
    let counter = CounterVec::new(opts, &["namespace"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Record Metrics
// ============================================================================

/// Total number of address entries skipped because they failed to decode
///
/// Labels:
/// - `namespace`: Instance namespace of the record
pub static MALFORMED_ENTRIES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_malformed_address_entries_total"),
        "Total number of malformed address entries skipped by namespace",
    );
    let counter = CounterVec::new(opts, &["namespace"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Watch Metrics
// ============================================================================

/// Total number of watch subscriptions re-established after a failure
///
/// Labels:
/// - `scope`: Which loop owned the subscription
pub static WATCH_RESTARTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_watch_restarts_total"),
        "Total number of watch subscriptions re-established by scope",
    );
    let counter = CounterVec::new(opts, &["scope"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Error Metrics
// ============================================================================

/// Total number of errors by scope and kind
///
/// Labels:
/// - `scope`: Which loop raised the error
/// - `error_kind`: [`crate::errors::ControllerError::kind`] of the error
pub static ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_errors_total"),
        "Total number of errors by scope and kind",
    );
    let counter = CounterVec::new(opts, &["scope", "error_kind"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record a successful reconciliation
///
/// # Arguments
/// * `scope` - The loop that handled the event
/// * `duration` - Duration of the reconciliation
pub fn record_reconciliation_success(scope: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[scope, "success"])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[scope])
        .observe(duration.as_secs_f64());
}

/// Record a failed reconciliation
///
/// # Arguments
/// * `scope` - The loop that handled the event
/// * `duration` - Duration of the reconciliation before failure
pub fn record_reconciliation_error(scope: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[scope, "error"])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[scope])
        .observe(duration.as_secs_f64());
}

pub fn record_cluster_created(template: &str) {
    CLUSTERS_CREATED_TOTAL.with_label_values(&[template]).inc();
}

pub fn record_cluster_deleted(namespace: &str) {
    CLUSTERS_DELETED_TOTAL.with_label_values(&[namespace]).inc();
}

/// Record address entries skipped while grouping
pub fn record_malformed_entries(namespace: &str, count: usize) {
    if count > 0 {
        #[allow(clippy::cast_precision_loss)]
        let count = count as f64;
        MALFORMED_ENTRIES_TOTAL
            .with_label_values(&[namespace])
            .inc_by(count);
    }
}

pub fn record_watch_restart(scope: &str) {
    WATCH_RESTARTS_TOTAL.with_label_values(&[scope]).inc();
}

/// Record an error
///
/// # Arguments
/// * `scope` - The loop where the error occurred
/// * `error_kind` - Category of error (e.g., `platform_unavailable`)
pub fn record_error(scope: &str, error_kind: &str) {
    ERRORS_TOTAL.with_label_values(&[scope, error_kind]).inc();
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_reconciliation_success() {
        let scope = "test_success_scope";

        record_reconciliation_success(scope, Duration::from_millis(500));

        let counter = RECONCILIATION_TOTAL.with_label_values(&[scope, "success"]);
        assert!(counter.get() >= 1.0);
        let histogram = RECONCILIATION_DURATION_SECONDS.with_label_values(&[scope]);
        assert!(histogram.get_sample_count() >= 1);
    }

    #[test]
    fn test_record_reconciliation_error() {
        let scope = "test_error_scope";

        record_reconciliation_error(scope, Duration::from_millis(10));

        let counter = RECONCILIATION_TOTAL.with_label_values(&[scope, "error"]);
        assert!(counter.get() >= 1.0);
    }

    #[test]
    fn test_record_malformed_entries_ignores_zero() {
        let namespace = "test-malformed-ns";

        record_malformed_entries(namespace, 0);
        assert!(MALFORMED_ENTRIES_TOTAL.with_label_values(&[namespace]).get() < 1.0);

        record_malformed_entries(namespace, 3);
        assert!(MALFORMED_ENTRIES_TOTAL.with_label_values(&[namespace]).get() >= 3.0);
    }

    #[test]
    fn test_gather_metrics() {
        record_cluster_created("test-template");
        record_watch_restart("test_scope");

        let text = gather_metrics().unwrap();
        assert!(text.contains("address_controller_clusters_created_total"));
        assert!(text.contains("address_controller_watch_restarts_total"));
    }
}
