//! Autoscaler configuration

use anyhow::{bail, Context, Result};
use autoscaler_lib::orchestrator::OrchestratorKind;
use autoscaler_lib::{MetricQuery, MetricUnit, Priority, ServiceConfig, ServiceType};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Environment variable naming an optional TOML config file
pub const CONFIG_FILE_ENV: &str = "AUTOSCALER_CONFIG";

const ENV_PREFIX: &str = "AUTOSCALER";

/// Autoscaler configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AutoscalerConfig {
    /// Instance name used in lifecycle log events
    #[serde(default = "default_instance")]
    pub instance: String,

    /// Base URL of the Prometheus server
    #[serde(default = "default_prometheus_url")]
    pub prometheus_url: String,

    /// Label carrying the service name in query results
    #[serde(default = "default_service_label")]
    pub service_label: String,

    /// Named queries services refer to
    #[serde(default = "default_queries")]
    pub queries: Vec<MetricQuery>,

    #[serde(default = "default_scale_up_threshold")]
    pub scale_up_threshold: f64,

    #[serde(default = "default_scale_down_threshold")]
    pub scale_down_threshold: f64,

    #[serde(default = "default_min_replicas")]
    pub min_replicas: u32,

    #[serde(default = "default_max_replicas")]
    pub max_replicas: u32,

    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,

    #[serde(default = "default_metrics_period")]
    pub metrics_period_secs: u64,

    #[serde(default = "default_evaluation_period")]
    pub evaluation_period_secs: u64,

    #[serde(default = "default_health_poll_interval")]
    pub health_poll_interval_secs: u64,

    #[serde(default = "default_health_timeout")]
    pub health_timeout_secs: u64,

    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Status API port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// How long shutdown waits for an in-flight scale
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Services with per-service overrides
    #[serde(default)]
    pub services: Vec<ServiceEntry>,

    /// Services that use the global defaults only
    #[serde(default)]
    pub service_names: Vec<String>,
}

/// Orchestrator backend settings
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub backend: OrchestratorKind,

    /// Docker CLI used by the swarm backend
    #[serde(default = "default_docker_binary")]
    pub docker_binary: String,

    /// Namespace used by the kubernetes backend
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            backend: OrchestratorKind::default(),
            docker_binary: default_docker_binary(),
            namespace: default_namespace(),
        }
    }
}

/// One configured service; unset fields fall back to the global defaults
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceEntry {
    pub name: String,
    #[serde(default, rename = "type")]
    pub service_type: ServiceType,
    #[serde(default)]
    pub priority: Priority,
    /// Query names to average; all configured queries when unset
    pub metrics: Option<Vec<String>>,
    pub scale_up_threshold: Option<f64>,
    pub scale_down_threshold: Option<f64>,
    pub min_replicas: Option<u32>,
    pub max_replicas: Option<u32>,
    pub cooldown_secs: Option<u64>,
}

fn default_instance() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "autoscaler".to_string())
}

fn default_prometheus_url() -> String {
    "http://prometheus:9090".to_string()
}

fn default_service_label() -> String {
    "container_label_com_docker_swarm_service_name".to_string()
}

fn default_queries() -> Vec<MetricQuery> {
    vec![
        MetricQuery::new(
            "cpu",
            "avg by (container_label_com_docker_swarm_service_name) \
             (rate(container_cpu_usage_seconds_total{container_label_com_docker_swarm_service_name!=\"\"}[1m]))",
            MetricUnit::Ratio,
        ),
        MetricQuery::new(
            "memory",
            "avg by (container_label_com_docker_swarm_service_name) \
             (container_memory_usage_bytes{container_label_com_docker_swarm_service_name!=\"\"} \
             / container_spec_memory_limit_bytes{container_label_com_docker_swarm_service_name!=\"\"})",
            MetricUnit::Ratio,
        ),
    ]
}

fn default_scale_up_threshold() -> f64 {
    75.0
}

fn default_scale_down_threshold() -> f64 {
    25.0
}

fn default_min_replicas() -> u32 {
    2
}

fn default_max_replicas() -> u32 {
    6
}

fn default_cooldown() -> u64 {
    300
}

fn default_metrics_period() -> u64 {
    30
}

fn default_evaluation_period() -> u64 {
    60
}

fn default_health_poll_interval() -> u64 {
    5
}

fn default_health_timeout() -> u64 {
    60
}

fn default_query_timeout() -> u64 {
    10
}

fn default_history_capacity() -> usize {
    100
}

fn default_api_port() -> u16 {
    8080
}

fn default_shutdown_grace() -> u64 {
    75
}

fn default_docker_binary() -> String {
    "docker".to_string()
}

fn default_namespace() -> String {
    "default".to_string()
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("service_names")
}

impl AutoscalerConfig {
    /// Load configuration from the optional config file and the environment
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_FILE_ENV).ok();
        Self::load_from(file.as_deref().map(Path::new), environment())
    }

    /// Load from `file` (if any) overlaid by `env`
    pub fn load_from(file: Option<&Path>, env: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(env)
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn metrics_period(&self) -> Duration {
        Duration::from_secs(self.metrics_period_secs)
    }

    pub fn evaluation_period(&self) -> Duration {
        Duration::from_secs(self.evaluation_period_secs)
    }

    pub fn health_poll_interval(&self) -> Duration {
        Duration::from_secs(self.health_poll_interval_secs)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Resolve every service against the global defaults and validate the result
    pub fn services(&self) -> Result<Vec<ServiceConfig>> {
        self.validate_globals()?;

        let named = self.service_names.iter().map(|name| ServiceEntry {
            name: name.trim().to_string(),
            ..Default::default()
        });
        let entries: Vec<ServiceEntry> = self.services.iter().cloned().chain(named).collect();

        if entries.is_empty() {
            bail!("No services configured; set `services` or AUTOSCALER_SERVICE_NAMES");
        }

        let query_names: HashSet<&str> = self.queries.iter().map(|q| q.name.as_str()).collect();
        let mut seen = HashSet::new();
        let mut resolved = Vec::with_capacity(entries.len());

        for entry in entries {
            if entry.name.is_empty() {
                bail!("Service name must not be empty");
            }
            if !seen.insert(entry.name.clone()) {
                bail!("Service {} is configured more than once", entry.name);
            }

            let service = self.resolve(entry);
            validate_service(&service, &query_names)?;
            resolved.push(service);
        }

        Ok(resolved)
    }

    fn resolve(&self, entry: ServiceEntry) -> ServiceConfig {
        ServiceConfig {
            metric_names: entry
                .metrics
                .unwrap_or_else(|| self.queries.iter().map(|q| q.name.clone()).collect()),
            scale_up_threshold: entry.scale_up_threshold.unwrap_or(self.scale_up_threshold),
            scale_down_threshold: entry
                .scale_down_threshold
                .unwrap_or(self.scale_down_threshold),
            min_replicas: entry.min_replicas.unwrap_or(self.min_replicas),
            max_replicas: entry.max_replicas.unwrap_or(self.max_replicas),
            cooldown: Duration::from_secs(entry.cooldown_secs.unwrap_or(self.cooldown_secs)),
            name: entry.name,
            service_type: entry.service_type,
            priority: entry.priority,
        }
    }

    fn validate_globals(&self) -> Result<()> {
        url::Url::parse(&self.prometheus_url)
            .with_context(|| format!("Invalid prometheus_url {}", self.prometheus_url))?;

        if self.service_label.is_empty() {
            bail!("service_label must not be empty");
        }

        let mut names = HashSet::new();
        for query in &self.queries {
            if !names.insert(query.name.as_str()) {
                bail!("Query {} is defined more than once", query.name);
            }
        }

        let periods = [
            ("metrics_period_secs", self.metrics_period_secs),
            ("evaluation_period_secs", self.evaluation_period_secs),
            ("health_poll_interval_secs", self.health_poll_interval_secs),
            ("health_timeout_secs", self.health_timeout_secs),
            ("query_timeout_secs", self.query_timeout_secs),
        ];
        for (key, value) in periods {
            if value == 0 {
                bail!("{} must be greater than zero", key);
            }
        }

        if self.history_capacity == 0 {
            bail!("history_capacity must be greater than zero");
        }

        Ok(())
    }
}

fn validate_service(service: &ServiceConfig, query_names: &HashSet<&str>) -> Result<()> {
    let name = &service.name;

    if !service.scale_up_threshold.is_finite() || !service.scale_down_threshold.is_finite() {
        bail!("Service {}: thresholds must be finite numbers", name);
    }
    if service.scale_down_threshold < 0.0 {
        bail!("Service {}: scale_down_threshold must not be negative", name);
    }
    if service.scale_down_threshold >= service.scale_up_threshold {
        bail!(
            "Service {}: scale_down_threshold ({}) must be below scale_up_threshold ({})",
            name,
            service.scale_down_threshold,
            service.scale_up_threshold
        );
    }
    if service.min_replicas < 1 {
        bail!("Service {}: min_replicas must be at least 1", name);
    }
    if service.min_replicas > service.max_replicas {
        bail!(
            "Service {}: min_replicas ({}) exceeds max_replicas ({})",
            name,
            service.min_replicas,
            service.max_replicas
        );
    }
    if service.metric_names.is_empty() {
        bail!("Service {}: at least one metric is required", name);
    }
    for metric in &service.metric_names {
        if !query_names.contains(metric.as_str()) {
            bail!("Service {}: metric {} has no configured query", name, metric);
        }
    }

    Ok(())
}
