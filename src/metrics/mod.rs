//! Metrics collection for observability

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec_with_registry, register_counter_with_registry,
    register_gauge_with_registry, register_histogram_vec_with_registry, Counter, CounterVec,
    Gauge, HistogramVec, Opts, Registry,
};
use std::sync::Arc;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| {
    Arc::new(Metrics::new().expect("Failed to initialize metrics"))
});

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Pipeline metrics
    pub queries_total: CounterVec,
    pub stage_duration: HistogramVec,
    pub stage_failures: CounterVec,

    // Embedding metrics
    pub embedding_requests: CounterVec,

    // Verifier metrics
    pub improvement_attempts: Counter,
    pub improvement_failures: Counter,

    // Index metrics
    pub indexed_chunks: Gauge,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let registry = Registry::new();

        let queries_total = register_counter_vec_with_registry!(
            Opts::new("queries_total", "Total pipeline queries"),
            &["status"],
            registry
        )?;

        let stage_duration = register_histogram_vec_with_registry!(
            "stage_duration_seconds",
            "Pipeline stage duration in seconds",
            &["stage"],
            registry
        )?;

        let stage_failures = register_counter_vec_with_registry!(
            Opts::new("stage_failures_total", "Total pipeline stage failures"),
            &["stage"],
            registry
        )?;

        let embedding_requests = register_counter_vec_with_registry!(
            Opts::new("embedding_requests_total", "Total embedding requests"),
            &["source"],
            registry
        )?;

        let improvement_attempts = register_counter_with_registry!(
            Opts::new(
                "improvement_attempts_total",
                "Total verifier improvement attempts"
            ),
            registry
        )?;

        let improvement_failures = register_counter_with_registry!(
            Opts::new(
                "improvement_failures_total",
                "Total failed verifier improvement attempts"
            ),
            registry
        )?;

        let indexed_chunks = register_gauge_with_registry!(
            Opts::new("indexed_chunks", "Chunks currently held by the vector index"),
            registry
        )?;

        Ok(Self {
            registry,
            queries_total,
            stage_duration,
            stage_failures,
            embedding_requests,
            improvement_attempts,
            improvement_failures,
            indexed_chunks,
        })
    }

    /// Get the metrics registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a completed pipeline query
    pub fn record_query(&self, success: bool) {
        let status = if success { "success" } else { "degraded" };
        self.queries_total.with_label_values(&[status]).inc();
    }

    /// Record an embedding request by source
    pub fn record_embedding(&self, endpoint: bool) {
        let source = if endpoint { "endpoint" } else { "fallback" };
        self.embedding_requests.with_label_values(&[source]).inc();
    }

    /// Record a stage duration in seconds
    pub fn record_stage(&self, stage: &str, seconds: f64) {
        self.stage_duration
            .with_label_values(&[stage])
            .observe(seconds);
    }

    /// Record a stage failure
    pub fn record_stage_failure(&self, stage: &str) {
        self.stage_failures.with_label_values(&[stage]).inc();
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or_default();

        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        let metrics = Metrics::new();
        assert!(metrics.is_ok());
    }

    #[test]
    fn test_record_query() {
        let metrics = Metrics::new().unwrap();
        metrics.record_query(true);
        metrics.record_query(false);
        // Metrics should be recorded without panicking
    }

    #[test]
    fn test_export_contains_registered_metrics() {
        let metrics = Metrics::new().unwrap();
        metrics.record_embedding(true);
        let exported = metrics.export_prometheus();
        assert!(exported.contains("embedding_requests_total"));
    }
}
