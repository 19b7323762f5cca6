//! Prometheus HTTP API client
//!
//! Runs instant queries against `/api/v1/query` and turns the `vector`
//! result into a per-service value map using a configurable label key.

use super::{async_trait, MetricQuery, MetricUnit, MetricsClient};
use crate::models::MetricSnapshot;
use crate::observability::AutoscalerMetrics;
use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

/// Per-query timeout against the backend
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Query used to probe reachability at startup
const PROBE_QUERY: &str = "vector(1)";

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    result_type: String,
    #[serde(default)]
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    #[serde(default)]
    metric: HashMap<String, String>,
    /// `[unix_timestamp, "value"]`
    value: (f64, String),
}

/// Metrics client backed by a Prometheus server
pub struct PrometheusClient {
    client: Client,
    query_url: Url,
    queries: Vec<MetricQuery>,
    service_label: String,
    metrics: AutoscalerMetrics,
}

impl PrometheusClient {
    /// Create a client for the Prometheus server at `base_url`
    pub fn new(
        base_url: &str,
        queries: Vec<MetricQuery>,
        service_label: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        // Keep any path prefix of the base URL when joining
        let base = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let query_url = Url::parse(&base)
            .context("Invalid Prometheus URL")?
            .join("api/v1/query")
            .context("Invalid Prometheus query path")?;

        Ok(Self {
            client,
            query_url,
            queries,
            service_label: service_label.into(),
            metrics: AutoscalerMetrics::new(),
        })
    }

    pub fn query_url(&self) -> &Url {
        &self.query_url
    }

    /// Run one instant query and return `service -> percentage`
    async fn run_query(&self, expr: &str, unit: MetricUnit) -> Result<BTreeMap<String, f64>> {
        let response = self
            .client
            .get(self.query_url.clone())
            .query(&[("query", expr)])
            .send()
            .await
            .context("Failed to send query")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read query response")?;

        let parsed: QueryResponse = serde_json::from_str(&body)
            .with_context(|| format!("Malformed query response ({})", status))?;

        if !status.is_success() || parsed.status != "success" {
            bail!(
                "Query failed ({}): {}",
                status,
                parsed.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }

        let data = parsed.data.context("Query response has no data")?;
        if data.result_type != "vector" {
            bail!("Unsupported result type: {}", data.result_type);
        }

        parse_vector(data.result, &self.service_label, unit)
    }
}

/// Convert a `vector` result into `service -> percentage`.
///
/// Series without the service label or with a non-finite value are skipped;
/// several series for one service are averaged.
fn parse_vector(
    result: serde_json::Value,
    service_label: &str,
    unit: MetricUnit,
) -> Result<BTreeMap<String, f64>> {
    let samples: Vec<VectorSample> =
        serde_json::from_value(result).context("Malformed vector result")?;

    let mut totals: BTreeMap<String, (f64, u32)> = BTreeMap::new();
    for sample in samples {
        let Some(service) = sample.metric.get(service_label) else {
            debug!(label = %service_label, "Skipping series without service label");
            continue;
        };

        let value = match sample.value.1.parse::<f64>() {
            Ok(v) if v.is_finite() => v,
            _ => {
                debug!(service = %service, value = %sample.value.1, "Skipping non-finite sample");
                continue;
            }
        };

        let entry = totals.entry(service.clone()).or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }

    Ok(totals
        .into_iter()
        .map(|(service, (sum, count))| (service, unit.to_percent(sum / count as f64)))
        .collect())
}

#[async_trait]
impl MetricsClient for PrometheusClient {
    async fn collect(&self) -> MetricSnapshot {
        let start = Instant::now();
        let mut snapshot = MetricSnapshot::new();

        for query in &self.queries {
            match self.run_query(&query.query, query.unit).await {
                Ok(values) if values.is_empty() => {
                    warn!(
                        metric = %query.name,
                        label = %self.service_label,
                        "Metric query returned no series for any service"
                    );
                }
                Ok(values) => {
                    debug!(metric = %query.name, services = values.len(), "Metric collected");
                    snapshot.insert_metric(query.name.clone(), values);
                }
                Err(e) => {
                    self.metrics.inc_query_failures(&query.name);
                    warn!(metric = %query.name, error = %format!("{:#}", e), "Metric query failed, skipping");
                }
            }
        }

        self.metrics
            .observe_collection_latency(start.elapsed().as_secs_f64());
        snapshot
    }

    fn metric_names(&self) -> Vec<String> {
        self.queries.iter().map(|q| q.name.clone()).collect()
    }

    async fn check(&self) -> Result<()> {
        self.run_query(PROBE_QUERY, MetricUnit::Percent)
            .await
            .with_context(|| format!("Prometheus at {} is not reachable", self.query_url))?;
        Ok(())
    }
}
