//! Core data models for the autoscaler

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Kind of workload a service runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    Web,
    Api,
    Worker,
    Database,
    #[default]
    #[serde(other)]
    Other,
}

/// Evaluation priority; higher priority services are visited first each tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// Static scaling policy for one service, fully resolved against global defaults
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub name: String,
    pub service_type: ServiceType,
    pub priority: Priority,
    /// Names of the metric queries averaged for this service
    pub metric_names: Vec<String>,
    /// Percentage above which the service gains a replica
    pub scale_up_threshold: f64,
    /// Percentage below which the service loses a replica
    pub scale_down_threshold: f64,
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub cooldown: Duration,
}

impl ServiceConfig {
    /// Clamp a replica count into this service's configured bounds
    pub fn clamp_replicas(&self, replicas: u32) -> u32 {
        replicas.clamp(self.min_replicas, self.max_replicas)
    }
}

/// Latest observed values: metric name -> service name -> percentage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricSnapshot(BTreeMap<String, BTreeMap<String, f64>>);

impl MetricSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the per-service values of one metric, replacing any previous values
    pub fn insert_metric(&mut self, metric: impl Into<String>, values: BTreeMap<String, f64>) {
        self.0.insert(metric.into(), values);
    }

    /// Value of `metric` for `service`, if the metric was collected and has a series for it
    pub fn value(&self, metric: &str, service: &str) -> Option<f64> {
        self.0.get(metric)?.get(service).copied()
    }

    pub fn metric_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, BTreeMap<String, f64>)> for MetricSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, BTreeMap<String, f64>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Direction of a scaling decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleDirection {
    Up,
    Down,
    None,
}

impl ScaleDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScaleDirection::Up => "up",
            ScaleDirection::Down => "down",
            ScaleDirection::None => "none",
        }
    }
}

impl fmt::Display for ScaleDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the policy produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionReason {
    Cooldown,
    NoMetrics,
    HighLoad,
    LowLoad,
    Stable,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::Cooldown => "cooldown",
            DecisionReason::NoMetrics => "no-metrics",
            DecisionReason::HighLoad => "high-load",
            DecisionReason::LowLoad => "low-load",
            DecisionReason::Stable => "stable",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one policy evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalingDecision {
    pub action: ScaleDirection,
    pub reason: DecisionReason,
    /// Average load percentage, absent when no metric was available or cooldown short-circuited
    pub observed_value: Option<f64>,
}

impl ScalingDecision {
    pub fn none(reason: DecisionReason) -> Self {
        Self {
            action: ScaleDirection::None,
            reason,
            observed_value: None,
        }
    }

    pub fn with_value(action: ScaleDirection, reason: DecisionReason, value: f64) -> Self {
        Self {
            action,
            reason,
            observed_value: Some(value),
        }
    }

    pub fn is_actionable(&self) -> bool {
        self.action != ScaleDirection::None
    }
}

/// Per-service mutable runtime state, written only by a recorded scaling action
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalingState {
    pub last_action_at: Option<DateTime<Utc>>,
    pub last_action: Option<ScaleDirection>,
}

/// Audit record of one executed scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalingAction {
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub action: ScaleDirection,
    pub from_replicas: u32,
    pub to_replicas: u32,
    pub reason: DecisionReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_value: Option<f64>,
    /// False when the health poll timed out before the target was observed
    pub health_confirmed: bool,
}

/// Summary of the latest metrics collection tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionReport {
    pub collected_at: DateTime<Utc>,
    pub metrics_collected: usize,
    pub metrics_configured: usize,
}

impl CollectionReport {
    pub fn has_data(&self) -> bool {
        self.metrics_collected > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_value_lookup() {
        let mut snapshot = MetricSnapshot::new();
        snapshot.insert_metric("cpu", BTreeMap::from([("web".to_string(), 42.0)]));

        assert_eq!(snapshot.value("cpu", "web"), Some(42.0));
        assert_eq!(snapshot.value("cpu", "api"), None);
        assert_eq!(snapshot.value("memory", "web"), None);
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_snapshot_serializes_as_nested_map() {
        let mut snapshot = MetricSnapshot::new();
        snapshot.insert_metric("cpu", BTreeMap::from([("web".to_string(), 50.0)]));

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json, serde_json::json!({"cpu": {"web": 50.0}}));
    }

    #[test]
    fn test_reason_wire_names() {
        assert_eq!(
            serde_json::to_value(DecisionReason::NoMetrics).unwrap(),
            "no-metrics"
        );
        assert_eq!(DecisionReason::HighLoad.to_string(), "high-load");
        assert_eq!(serde_json::to_value(ScaleDirection::Up).unwrap(), "up");
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::Medium > Priority::Low);
    }

    #[test]
    fn test_unknown_service_type_maps_to_other() {
        let parsed: ServiceType = serde_json::from_str("\"cache\"").unwrap();
        assert_eq!(parsed, ServiceType::Other);
    }
}
