//! Load metrics collection
//!
//! This module hides the metrics backend behind the [`MetricsClient`] trait.
//! Implementations return a typed [`MetricSnapshot`] of percentages keyed by
//! metric name and service name; backend response shapes never leave the
//! implementation.

mod prometheus_api;

pub use prometheus_api::{PrometheusClient, DEFAULT_QUERY_TIMEOUT};

use crate::models::MetricSnapshot;
use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use async_trait::async_trait;

/// How a query's raw values relate to a percentage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricUnit {
    /// 0–1 ratio, multiplied by 100
    #[default]
    Ratio,
    /// Already a percentage
    Percent,
}

impl MetricUnit {
    pub fn to_percent(&self, value: f64) -> f64 {
        match self {
            MetricUnit::Ratio => value * 100.0,
            MetricUnit::Percent => value,
        }
    }
}

/// One named query against the metrics backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricQuery {
    /// Name services refer to in their metric list
    pub name: String,
    /// Backend query expression
    pub query: String,
    #[serde(default)]
    pub unit: MetricUnit,
}

impl MetricQuery {
    pub fn new(name: impl Into<String>, query: impl Into<String>, unit: MetricUnit) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
            unit,
        }
    }
}

/// Trait for metrics backend implementations
#[async_trait]
pub trait MetricsClient: Send + Sync {
    /// Run every configured query and return a fresh snapshot.
    ///
    /// A failing query is logged and left out; if all fail the snapshot is empty.
    async fn collect(&self) -> MetricSnapshot;

    /// Names of the configured queries
    fn metric_names(&self) -> Vec<String>;

    /// Verify the backend is reachable
    async fn check(&self) -> Result<()>;
}
