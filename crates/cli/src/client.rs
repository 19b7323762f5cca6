//! API client for the autoscaler status API

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Metric name -> service name -> value in percent
pub type MetricSnapshot = BTreeMap<String, BTreeMap<String, f64>>;

/// API client for the autoscaler status endpoints
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.get("health").await
    }

    pub async fn metrics(&self) -> Result<MetricSnapshot> {
        self.get("metrics").await
    }

    pub async fn history(&self) -> Result<Vec<ScalingAction>> {
        self.get("history").await
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub services: BTreeMap<String, ServiceStatus>,
    pub metrics: MetricSnapshot,
    pub scaling_history: Vec<ScalingAction>,
    #[serde(default)]
    pub scaling_in_progress: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub name: String,
    pub replicas: Option<u32>,
    pub last_scale_action: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_action: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalingAction {
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub action: String,
    pub from_replicas: u32,
    pub to_replicas: u32,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_value: Option<f64>,
    #[serde(default = "default_confirmed")]
    pub health_confirmed: bool,
}

fn default_confirmed() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEALTH_BODY: &str = r#"{
        "status": "healthy",
        "timestamp": "2024-05-01T12:00:00Z",
        "services": {
            "web": {"name": "web", "replicas": 3, "lastScaleAction": "2024-05-01T11:55:00Z", "lastAction": "up"},
            "api": {"name": "api", "replicas": null, "lastScaleAction": null}
        },
        "metrics": {"cpu": {"web": 81.5}},
        "scalingHistory": [{
            "timestamp": "2024-05-01T11:55:00Z",
            "service": "web",
            "action": "up",
            "fromReplicas": 2,
            "toReplicas": 3,
            "reason": "high-load",
            "observedValue": 90.0,
            "healthConfirmed": true
        }],
        "scalingInProgress": false,
        "lastCollection": null
    }"#;

    #[tokio::test]
    async fn test_health() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/health")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(HEALTH_BODY)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let health = client.health().await.unwrap();

        mock.assert_async().await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.services["web"].replicas, Some(3));
        assert_eq!(health.services["api"].replicas, None);
        assert_eq!(health.metrics["cpu"]["web"], 81.5);
        assert_eq!(health.scaling_history[0].to_replicas, 3);
    }

    #[tokio::test]
    async fn test_history() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/history")
            .with_status(200)
            .with_body(
                r#"[{"timestamp":"2024-05-01T11:55:00Z","service":"web","action":"down",
                    "fromReplicas":3,"toReplicas":2,"reason":"low-load","healthConfirmed":false}]"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let history = client.history().await.unwrap();

        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, "down");
        assert_eq!(history[0].observed_value, None);
        assert!(!history[0].health_confirmed);
    }

    #[tokio::test]
    async fn test_api_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/metrics")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client.metrics().await.unwrap_err();

        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(ApiClient::new("not a url").is_err());
    }
}
