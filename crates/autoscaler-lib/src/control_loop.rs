//! The autoscaling control loop
//!
//! Two independently timed tasks share one [`ControlLoopState`]:
//! - the metrics task replaces the metrics snapshot every metrics period
//! - the evaluation task decides and executes scaling every evaluation period
//!
//! The metrics task never waits on the evaluation task. A scaling operation
//! in progress when shutdown arrives is allowed to finish, but no further
//! service is evaluated in that round.

use crate::executor::{ExecutionOutcome, ExecutorConfig, ScalingExecutor};
use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::metrics::MetricsClient;
use crate::models::{CollectionReport, ScalingDecision, ServiceConfig};
use crate::observability::{AutoscalerMetrics, StructuredLogger};
use crate::orchestrator::OrchestrationClient;
use crate::policy::decide;
use crate::state::ControlLoopState;
use anyhow::Result;
use chrono::Utc;
use std::cmp::Reverse;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Configuration for the control loop timers
#[derive(Debug, Clone)]
pub struct ControlLoopConfig {
    /// Interval between metrics collections (default: 30 seconds)
    pub metrics_period: Duration,
    /// Interval between policy evaluations (default: 60 seconds)
    pub evaluation_period: Duration,
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self {
            metrics_period: Duration::from_secs(30),
            evaluation_period: Duration::from_secs(60),
        }
    }
}

/// Why a service was passed over this evaluation round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The orchestrator could not report replicas
    ReplicaLookupFailed,
    /// No running replicas, so no baseline to scale from
    NoReplicas,
    /// Another scale execution holds the global guard
    GuardHeld,
}

/// Result of evaluating one service
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceEvaluation {
    Skipped(SkipReason),
    /// The policy returned `none`
    Decided(ScalingDecision),
    Executed(ScalingDecision, ExecutionOutcome),
}

/// Periodic metrics collection and scaling evaluation
pub struct ControlLoop {
    services: Vec<ServiceConfig>,
    metrics_client: Arc<dyn MetricsClient>,
    orchestrator: Arc<dyn OrchestrationClient>,
    executor: ScalingExecutor,
    state: Arc<ControlLoopState>,
    config: ControlLoopConfig,
    metrics: AutoscalerMetrics,
}

impl ControlLoop {
    /// Create a control loop; services are evaluated highest priority first, then by name
    pub fn new(
        mut services: Vec<ServiceConfig>,
        metrics_client: Arc<dyn MetricsClient>,
        orchestrator: Arc<dyn OrchestrationClient>,
        state: Arc<ControlLoopState>,
        config: ControlLoopConfig,
        executor_config: ExecutorConfig,
        logger: StructuredLogger,
    ) -> Self {
        services.sort_by(|a, b| {
            Reverse(a.priority)
                .cmp(&Reverse(b.priority))
                .then_with(|| a.name.cmp(&b.name))
        });

        let executor =
            ScalingExecutor::new(orchestrator.clone(), state.clone(), executor_config, logger);

        Self {
            services,
            metrics_client,
            orchestrator,
            executor,
            state,
            config,
            metrics: AutoscalerMetrics::new(),
        }
    }

    pub fn state(&self) -> Arc<ControlLoopState> {
        self.state.clone()
    }

    /// Services in evaluation order
    pub fn services(&self) -> &[ServiceConfig] {
        &self.services
    }

    pub fn config(&self) -> &ControlLoopConfig {
        &self.config
    }

    /// Run one metrics collection and publish the new snapshot
    pub async fn collect_once(&self) -> CollectionReport {
        let snapshot = self.metrics_client.collect().await;
        let report = CollectionReport {
            collected_at: Utc::now(),
            metrics_collected: snapshot.len(),
            metrics_configured: self.metrics_client.metric_names().len(),
        };

        if !report.has_data() {
            warn!(
                configured = report.metrics_configured,
                "No metrics collected, services will not be scaled this cycle"
            );
        } else {
            debug!(
                collected = report.metrics_collected,
                configured = report.metrics_configured,
                "Metrics snapshot updated"
            );
        }

        self.state.replace_snapshot(snapshot, report).await;
        report
    }

    /// Evaluate every service once, in priority order
    pub async fn evaluate_once(&self) -> Vec<(String, ServiceEvaluation)> {
        self.evaluate_round(None).await.0
    }

    /// Evaluate services in priority order until `shutdown` fires.
    /// Returns the completed evaluations and whether the round was cut short.
    async fn evaluate_round(
        &self,
        mut shutdown: Option<&mut broadcast::Receiver<()>>,
    ) -> (Vec<(String, ServiceEvaluation)>, bool) {
        let mut results = Vec::with_capacity(self.services.len());
        for service in &self.services {
            if let Some(rx) = shutdown.as_mut() {
                if !matches!(rx.try_recv(), Err(TryRecvError::Empty)) {
                    info!(
                        service = %service.name,
                        evaluated = results.len(),
                        "Shutdown requested, ending evaluation round early"
                    );
                    return (results, true);
                }
            }
            let evaluation = self.evaluate_service(service).await;
            results.push((service.name.clone(), evaluation));
        }
        (results, false)
    }

    /// Evaluate one service and execute the decision if it calls for scaling
    pub async fn evaluate_service(&self, service: &ServiceConfig) -> ServiceEvaluation {
        let name = service.name.as_str();

        let replicas = match self.orchestrator.healthy_replica_count(name).await {
            Ok(replicas) => replicas,
            Err(e) => {
                warn!(service = %name, error = %e, "Failed to read replica count, skipping");
                return ServiceEvaluation::Skipped(SkipReason::ReplicaLookupFailed);
            }
        };

        self.state.set_replicas(name, replicas);
        self.metrics.set_service_replicas(name, replicas);

        if replicas == 0 {
            warn!(service = %name, "Service has no running replicas, skipping");
            return ServiceEvaluation::Skipped(SkipReason::NoReplicas);
        }

        let snapshot = self.state.snapshot().await;
        let scaling_state = self.state.scaling_state(name);
        let decision = decide(service, &snapshot, &scaling_state, Utc::now());

        self.metrics
            .inc_decision(name, decision.action, decision.reason.as_str());
        debug!(
            service = %name,
            replicas = replicas,
            action = %decision.action,
            reason = %decision.reason,
            observed_value = ?decision.observed_value,
            "Scaling decision"
        );

        if !decision.is_actionable() {
            return ServiceEvaluation::Decided(decision);
        }

        if self.state.is_scaling() {
            info!(service = %name, "Scaling guard held, skipping service this round");
            return ServiceEvaluation::Skipped(SkipReason::GuardHeld);
        }

        let outcome = self.executor.try_execute(service, &decision, replicas).await;
        ServiceEvaluation::Executed(decision, outcome)
    }

    /// Spawn the metrics and evaluation tasks; both stop on `shutdown`
    pub fn spawn(self: &Arc<Self>, shutdown: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(self.clone().run_metrics(shutdown.subscribe())),
            tokio::spawn(self.clone().run_evaluation(shutdown.subscribe())),
        ]
    }

    async fn run_metrics(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.metrics_period.as_secs(),
            "Starting metrics collection loop"
        );

        let mut ticker = interval(self.config.metrics_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("Shutting down metrics collection loop");
                    break;
                }
                _ = ticker.tick() => {
                    self.collect_once().await;
                }
            }
        }
    }

    async fn run_evaluation(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.evaluation_period.as_secs(),
            services = self.services.len(),
            "Starting scaling evaluation loop"
        );

        // First evaluation waits one period so it sees a collected snapshot
        let period = self.config.evaluation_period;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("Shutting down scaling evaluation loop");
                    break;
                }
                _ = ticker.tick() => {
                    let (results, stopped) = self.evaluate_round(Some(&mut shutdown)).await;
                    let scaled = results
                        .iter()
                        .filter(|(_, r)| matches!(r, ServiceEvaluation::Executed(_, o) if o.is_scaled()))
                        .count();
                    debug!(services = results.len(), scaled = scaled, "Evaluation cycle complete");
                    if stopped {
                        info!("Shutting down scaling evaluation loop");
                        break;
                    }
                }
            }
        }
    }
}

/// Builder for creating the control loop
pub struct ControlLoopBuilder {
    services: Vec<ServiceConfig>,
    metrics_client: Option<Arc<dyn MetricsClient>>,
    orchestrator: Option<Arc<dyn OrchestrationClient>>,
    config: ControlLoopConfig,
    executor_config: ExecutorConfig,
    history_capacity: usize,
    logger: StructuredLogger,
}

impl ControlLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            services: Vec::new(),
            metrics_client: None,
            orchestrator: None,
            config: ControlLoopConfig::default(),
            executor_config: ExecutorConfig::default(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            logger: StructuredLogger::new("autoscaler"),
        }
    }

    pub fn services(mut self, services: Vec<ServiceConfig>) -> Self {
        self.services = services;
        self
    }

    pub fn metrics_client(mut self, client: Arc<dyn MetricsClient>) -> Self {
        self.metrics_client = Some(client);
        self
    }

    pub fn orchestrator(mut self, orchestrator: Arc<dyn OrchestrationClient>) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    pub fn metrics_period(mut self, period: Duration) -> Self {
        self.config.metrics_period = period;
        self
    }

    pub fn evaluation_period(mut self, period: Duration) -> Self {
        self.config.evaluation_period = period;
        self
    }

    pub fn health_poll_interval(mut self, interval: Duration) -> Self {
        self.executor_config.health_poll_interval = interval;
        self
    }

    pub fn health_timeout(mut self, timeout: Duration) -> Self {
        self.executor_config.health_timeout = timeout;
        self
    }

    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Build the control loop and its shared state
    pub fn build(self) -> Result<ControlLoop> {
        let metrics_client = self
            .metrics_client
            .ok_or_else(|| anyhow::anyhow!("Metrics client is required"))?;
        let orchestrator = self
            .orchestrator
            .ok_or_else(|| anyhow::anyhow!("Orchestrator is required"))?;
        if self.services.is_empty() {
            anyhow::bail!("At least one service is required");
        }

        let state = Arc::new(ControlLoopState::new(
            self.services.iter().map(|s| s.name.clone()),
            self.history_capacity,
        ));

        Ok(ControlLoop::new(
            self.services,
            metrics_client,
            orchestrator,
            state,
            self.config,
            self.executor_config,
            self.logger,
        ))
    }
}

impl Default for ControlLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
