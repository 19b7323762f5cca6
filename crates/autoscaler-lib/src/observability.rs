//! Observability infrastructure for the autoscaler
//!
//! Provides:
//! - Prometheus metrics (collection latency, query failures, decisions, scale operations)
//! - Structured JSON logging with tracing

use crate::models::{ScaleDirection, ScalingAction};
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Histogram, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for metrics collection latency (in seconds)
const COLLECTION_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Histogram buckets for scale execution duration, up to the health timeout (in seconds)
const SCALE_BUCKETS: &[f64] = &[0.5, 1.0, 5.0, 10.0, 20.0, 30.0, 45.0, 60.0, 90.0, 120.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AutoscalerMetricsInner> = OnceLock::new();

struct AutoscalerMetricsInner {
    collection_latency_seconds: Histogram,
    query_failures: IntCounterVec,
    decisions: IntCounterVec,
    scale_operations: IntCounterVec,
    scale_duration_seconds: HistogramVec,
    service_replicas: IntGaugeVec,
    scaling_in_progress: IntGauge,
}

impl AutoscalerMetricsInner {
    fn new() -> Self {
        Self {
            collection_latency_seconds: register_histogram!(
                "autoscaler_collection_latency_seconds",
                "Time spent running all metric queries in one collection tick",
                COLLECTION_BUCKETS.to_vec()
            )
            .expect("Failed to register collection_latency_seconds"),

            query_failures: register_int_counter_vec!(
                "autoscaler_metric_query_failures_total",
                "Metric queries that failed or returned malformed data",
                &["metric"]
            )
            .expect("Failed to register query_failures"),

            decisions: register_int_counter_vec!(
                "autoscaler_decisions_total",
                "Scaling decisions produced by the policy",
                &["service", "action", "reason"]
            )
            .expect("Failed to register decisions"),

            scale_operations: register_int_counter_vec!(
                "autoscaler_scale_operations_total",
                "Scale executions by outcome",
                &["service", "result"]
            )
            .expect("Failed to register scale_operations"),

            scale_duration_seconds: register_histogram_vec!(
                "autoscaler_scale_duration_seconds",
                "Time from scale command to health confirmation or timeout",
                &["service"],
                SCALE_BUCKETS.to_vec()
            )
            .expect("Failed to register scale_duration_seconds"),

            service_replicas: register_int_gauge_vec!(
                "autoscaler_service_replicas",
                "Healthy replicas last observed per service",
                &["service"]
            )
            .expect("Failed to register service_replicas"),

            scaling_in_progress: register_int_gauge!(
                "autoscaler_scaling_in_progress",
                "1 while a scale execution holds the global guard"
            )
            .expect("Failed to register scaling_in_progress"),
        }
    }
}

/// Autoscaler metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone, Debug)]
pub struct AutoscalerMetrics {
    _private: (),
}

impl Default for AutoscalerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AutoscalerMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AutoscalerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AutoscalerMetricsInner {
        GLOBAL_METRICS.get_or_init(AutoscalerMetricsInner::new)
    }

    pub fn observe_collection_latency(&self, duration_secs: f64) {
        self.inner().collection_latency_seconds.observe(duration_secs);
    }

    pub fn inc_query_failures(&self, metric: &str) {
        self.inner().query_failures.with_label_values(&[metric]).inc();
    }

    pub fn inc_decision(&self, service: &str, action: ScaleDirection, reason: &str) {
        self.inner()
            .decisions
            .with_label_values(&[service, action.as_str(), reason])
            .inc();
    }

    /// Count a scale execution; `result` is one of `confirmed`, `timeout`, `failed`
    pub fn inc_scale_operation(&self, service: &str, result: &str) {
        self.inner()
            .scale_operations
            .with_label_values(&[service, result])
            .inc();
    }

    pub fn observe_scale_duration(&self, service: &str, duration_secs: f64) {
        self.inner()
            .scale_duration_seconds
            .with_label_values(&[service])
            .observe(duration_secs);
    }

    pub fn set_service_replicas(&self, service: &str, replicas: u32) {
        self.inner()
            .service_replicas
            .with_label_values(&[service])
            .set(i64::from(replicas));
    }

    pub fn set_scaling_in_progress(&self, in_progress: bool) {
        self.inner()
            .scaling_in_progress
            .set(if in_progress { 1 } else { 0 });
    }
}

/// Structured logger for autoscaler lifecycle events
#[derive(Clone, Debug)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, backend: &str, services: usize) {
        info!(
            event = "autoscaler_started",
            instance = %self.instance,
            version = %version,
            backend = %backend,
            services = services,
            "Autoscaler started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "autoscaler_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Autoscaler shutting down"
        );
    }

    /// Log a committed scaling action
    pub fn log_scaling_action(&self, action: &ScalingAction) {
        info!(
            event = "scaling_action_recorded",
            instance = %self.instance,
            service = %action.service,
            action = %action.action,
            from_replicas = action.from_replicas,
            to_replicas = action.to_replicas,
            reason = %action.reason,
            observed_value = ?action.observed_value,
            health_confirmed = action.health_confirmed,
            "Scaling action recorded"
        );
    }

    /// Log a scale command the orchestrator rejected
    pub fn log_scale_failure(&self, service: &str, target: u32, error: &str) {
        warn!(
            event = "scaling_failed",
            instance = %self.instance,
            service = %service,
            target_replicas = target,
            error = %error,
            "Scale command failed, service assumed unchanged"
        );
    }

    pub fn log_health_timeout(&self, service: &str, target: u32, healthy: Option<u32>) {
        warn!(
            event = "health_confirmation_timeout",
            instance = %self.instance,
            service = %service,
            target_replicas = target,
            last_healthy = ?healthy,
            "Replicas not confirmed healthy before timeout, recording action anyway"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_autoscaler_metrics_creation() {
        let metrics = AutoscalerMetrics::new();
        let other = metrics.clone();

        metrics.observe_collection_latency(0.02);
        metrics.inc_query_failures("cpu");
        metrics.inc_decision("web", ScaleDirection::Up, "high-load");
        other.inc_scale_operation("web", "confirmed");
        other.observe_scale_duration("web", 12.0);
        other.set_service_replicas("web", 3);
        other.set_scaling_in_progress(false);

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "autoscaler_decisions_total"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("autoscaler-0");
        assert_eq!(logger.instance, "autoscaler-0");
    }
}
