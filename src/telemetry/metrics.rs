//! Metrics
//!
//! Token acquisition metrics interfaces and implementations.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Metric labels.
pub type MetricLabels = BTreeMap<String, String>;

/// Token metrics interface.
pub trait TokenMetrics: Send + Sync {
    /// Record an outgoing token request.
    fn record_token_request(&self, node_id: &str, grant_type: &str);

    /// Record the outcome of a token request.
    fn record_token_outcome(&self, node_id: &str, grant_type: &str, success: bool);

    /// Record request duration.
    fn record_request_duration(&self, grant_type: &str, duration_ms: f64);

    /// Record error.
    fn record_error(&self, error_code: &str, node_id: &str);

    /// Record a lifecycle state change.
    fn record_transition(&self, node_id: &str, from: &str, to: &str);
}

/// No-op metrics implementation.
pub struct NoOpMetrics;

impl TokenMetrics for NoOpMetrics {
    fn record_token_request(&self, _node_id: &str, _grant_type: &str) {}
    fn record_token_outcome(&self, _node_id: &str, _grant_type: &str, _success: bool) {}
    fn record_request_duration(&self, _grant_type: &str, _duration_ms: f64) {}
    fn record_error(&self, _error_code: &str, _node_id: &str) {}
    fn record_transition(&self, _node_id: &str, _from: &str, _to: &str) {}
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
    pub timestamp: u64,
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
        self.lock().clone()
    }

    /// Get entries by name.
    pub fn get_entries_by_name(&self, name: &str) -> Vec<MetricEntry> {
        self.lock()
            .iter()
            .filter(|e| e.name == name)
            .cloned()
            .collect()
    }

    /// Clear all entries.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<MetricEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        self.lock().push(MetricEntry {
            name: name.to_string(),
            value,
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            timestamp: now,
        });
    }
}

impl TokenMetrics for InMemoryMetrics {
    fn record_token_request(&self, node_id: &str, grant_type: &str) {
        self.record(
            "oauth2_token_requests_total",
            1.0,
            &[("node_id", node_id), ("grant_type", grant_type)],
        );
    }

    fn record_token_outcome(&self, node_id: &str, grant_type: &str, success: bool) {
        let success = success.to_string();
        self.record(
            "oauth2_token_outcomes_total",
            1.0,
            &[
                ("node_id", node_id),
                ("grant_type", grant_type),
                ("success", success.as_str()),
            ],
        );
    }

    fn record_request_duration(&self, grant_type: &str, duration_ms: f64) {
        self.record(
            "oauth2_request_duration_ms",
            duration_ms,
            &[("grant_type", grant_type)],
        );
    }

    fn record_error(&self, error_code: &str, node_id: &str) {
        self.record(
            "oauth2_errors_total",
            1.0,
            &[("error_code", error_code), ("node_id", node_id)],
        );
    }

    fn record_transition(&self, node_id: &str, from: &str, to: &str) {
        self.record(
            "oauth2_lifecycle_transitions_total",
            1.0,
            &[("node_id", node_id), ("from", from), ("to", to)],
        );
    }
}

/// Create in-memory metrics for testing.
pub fn create_in_memory_metrics() -> InMemoryMetrics {
    InMemoryMetrics::new()
}
