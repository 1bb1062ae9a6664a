//! Metrics collection for observability
//!
//! Every classified outcome increments one counter of a single family:
//!
//! - `<prefix>_operations_total{metric="success_op"}`
//! - `<prefix>_operations_total{metric="error.<kind>"}`
//! - `<prefix>_operations_total{metric="error.unknown"}`

use prometheus::{
    register_int_counter_vec_with_registry, Encoder, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::collections::BTreeMap;

/// Destination for outcome counters. Implementations must not block.
pub trait TelemetrySink: Send + Sync {
    /// Add one to the counter called `name`
    fn increment_counter(&self, name: &str);
}

/// Prometheus-backed sink with its own registry
#[derive(Clone)]
pub struct Metrics {
    /// Outcome counters keyed by metric name
    pub operations_total: IntCounterVec,

    /// Prometheus registry
    pub registry: Registry,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create the counter family `<prefix>_operations_total`
    pub fn new(prefix: &str) -> prometheus::Result<Self> {
        let registry = Registry::new();

        let operations_total = register_int_counter_vec_with_registry!(
            Opts::new(
                format!("{}_operations_total", prefix),
                "Ledger operations by outcome metric"
            ),
            &["metric"],
            registry
        )?;

        Ok(Self {
            operations_total,
            registry,
        })
    }

    /// Current value of the counter called `name`
    pub fn count(&self, name: &str) -> u64 {
        self.operations_total.with_label_values(&[name]).get()
    }

    /// Every counter touched so far, by name
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        let mut counts = BTreeMap::new();
        for family in self.registry.gather() {
            for metric in family.get_metric() {
                let name = metric
                    .get_label()
                    .iter()
                    .find(|label| label.get_name() == "metric")
                    .map(|label| label.get_value().to_string());
                if let Some(name) = name {
                    counts.insert(name, metric.get_counter().get_value() as u64);
                }
            }
        }
        counts
    }

    /// Render the registry in the Prometheus text format
    pub fn export(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl TelemetrySink for Metrics {
    fn increment_counter(&self, name: &str) {
        self.operations_total.with_label_values(&[name]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new("crdb").unwrap();
        assert_eq!(metrics.count("success_op"), 0);
        assert!(metrics.snapshot().values().all(|v| *v == 0));
    }

    #[test]
    fn test_increment_counter() {
        let metrics = Metrics::new("crdb").unwrap();
        metrics.increment_counter("success_op");
        metrics.increment_counter("success_op");
        metrics.increment_counter("error.insufficient_funds");

        assert_eq!(metrics.count("success_op"), 2);
        assert_eq!(metrics.count("error.insufficient_funds"), 1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.get("success_op"), Some(&2));
        assert_eq!(snapshot.get("error.insufficient_funds"), Some(&1));
    }

    #[test]
    fn test_export_text_format() {
        let metrics = Metrics::new("crdb").unwrap();
        metrics.increment_counter("error.commit_tx");

        let text = metrics.export().unwrap();
        assert!(text.contains("crdb_operations_total{metric=\"error.commit_tx\"} 1"));
    }

    #[test]
    fn test_separate_instances_do_not_share_counts() {
        let first = Metrics::new("crdb").unwrap();
        let second = Metrics::new("crdb").unwrap();
        first.increment_counter("success_op");
        assert_eq!(second.count("success_op"), 0);
    }
}
