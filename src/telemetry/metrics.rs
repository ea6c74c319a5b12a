//! Metrics
//!
//! Metrics collection for classification, retry and session refresh.

use parking_lot::Mutex;
use std::collections::HashMap;

use crate::types::FailureKind;

/// Metric labels.
pub type MetricLabels = HashMap<String, String>;

/// Execution-layer metrics interface.
pub trait ResilienceMetrics: Send + Sync {
    /// Record a classified failure.
    fn record_failure(&self, operation: &str, kind: FailureKind);

    /// Record a retry attempt being started.
    fn record_retry_attempt(&self, operation: &str, attempt: u32);

    /// Record a retry budget running out.
    fn record_retry_exhausted(&self, operation: &str, kind: FailureKind);

    /// Record a completed credential refresh.
    fn record_refresh(&self, success: bool);

    /// Record a caller joining an in-flight refresh instead of starting one.
    fn record_refresh_joined(&self);

    /// Record a privilege check.
    fn record_privilege_check(&self, granted: bool);
}

/// No-op metrics implementation.
pub struct NoOpMetrics;

impl ResilienceMetrics for NoOpMetrics {
    fn record_failure(&self, _operation: &str, _kind: FailureKind) {}
    fn record_retry_attempt(&self, _operation: &str, _attempt: u32) {}
    fn record_retry_exhausted(&self, _operation: &str, _kind: FailureKind) {}
    fn record_refresh(&self, _success: bool) {}
    fn record_refresh_joined(&self) {}
    fn record_privilege_check(&self, _granted: bool) {}
}

/// No-op metrics singleton.
pub fn no_op_metrics() -> NoOpMetrics {
    NoOpMetrics
}

/// Metric entry for in-memory storage.
#[derive(Debug, Clone)]
pub struct MetricEntry {
    pub name: String,
    pub value: f64,
    pub labels: MetricLabels,
}

/// In-memory metrics for testing.
#[derive(Default)]
pub struct InMemoryMetrics {
    entries: Mutex<Vec<MetricEntry>>,
}

impl InMemoryMetrics {
    /// Create new in-memory metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded entries.
    pub fn get_entries(&self) -> Vec<MetricEntry> {
        self.entries.lock().clone()
    }

    /// Get entries by name.
    pub fn get_entries_by_name(&self, name: &str) -> Vec<MetricEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.name == name)
            .cloned()
            .collect()
    }

    /// Sum of values recorded under `name`.
    pub fn total(&self, name: &str) -> f64 {
        self.get_entries_by_name(name).iter().map(|e| e.value).sum()
    }

    /// Clear all entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn record(&self, name: &str, value: f64, labels: &[(&str, String)]) {
        let labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();

        self.entries.lock().push(MetricEntry {
            name: name.to_string(),
            value,
            labels,
        });
    }
}

impl ResilienceMetrics for InMemoryMetrics {
    fn record_failure(&self, operation: &str, kind: FailureKind) {
        self.record(
            "resilience_failures_total",
            1.0,
            &[("operation", operation.to_string()), ("kind", kind.to_string())],
        );
    }

    fn record_retry_attempt(&self, operation: &str, attempt: u32) {
        self.record(
            "resilience_retry_attempts_total",
            1.0,
            &[("operation", operation.to_string()), ("attempt", attempt.to_string())],
        );
    }

    fn record_retry_exhausted(&self, operation: &str, kind: FailureKind) {
        self.record(
            "resilience_retry_exhausted_total",
            1.0,
            &[("operation", operation.to_string()), ("kind", kind.to_string())],
        );
    }

    fn record_refresh(&self, success: bool) {
        self.record(
            "session_refreshes_total",
            1.0,
            &[("success", success.to_string())],
        );
    }

    fn record_refresh_joined(&self) {
        self.record("session_refresh_joined_total", 1.0, &[]);
    }

    fn record_privilege_check(&self, granted: bool) {
        self.record(
            "session_privilege_checks_total",
            1.0,
            &[("granted", granted.to_string())],
        );
    }
}

/// Create in-memory metrics for testing.
pub fn create_in_memory_metrics() -> InMemoryMetrics {
    InMemoryMetrics::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_op_metrics() {
        let metrics = no_op_metrics();
        // Should not panic
        metrics.record_failure("load", FailureKind::Network);
        metrics.record_refresh(true);
    }

    #[test]
    fn test_in_memory_metrics() {
        let metrics = InMemoryMetrics::new();

        metrics.record_failure("load", FailureKind::Network);
        metrics.record_retry_attempt("load", 1);
        metrics.record_retry_attempt("load", 2);

        assert_eq!(metrics.get_entries().len(), 3);
        assert_eq!(metrics.total("resilience_retry_attempts_total"), 2.0);

        let failures = metrics.get_entries_by_name("resilience_failures_total");
        assert_eq!(failures[0].labels.get("kind"), Some(&"network".to_string()));
    }

    #[test]
    fn test_clear_entries() {
        let metrics = InMemoryMetrics::new();
        metrics.record_refresh_joined();

        assert!(!metrics.get_entries().is_empty());
        metrics.clear();
        assert!(metrics.get_entries().is_empty());
    }
}
