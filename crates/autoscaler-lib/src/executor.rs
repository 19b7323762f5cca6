//! Scaling executor
//!
//! Turns an actionable [`ScalingDecision`] into orchestrator calls. One
//! execution at a time is allowed across all services (the global guard in
//! [`ControlLoopState`]); a committed action starts the service's cooldown
//! and is appended to the history.
//!
//! Health confirmation is optimistic: if the new replicas are not observed
//! healthy before the timeout, the action is still recorded, with
//! `health_confirmed = false`.

use crate::models::{ScaleDirection, ScalingAction, ScalingDecision, ServiceConfig};
use crate::observability::{AutoscalerMetrics, StructuredLogger};
use crate::orchestrator::OrchestrationClient;
use crate::state::ControlLoopState;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default interval between health polls after a scale command
pub const DEFAULT_HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default time allowed for new replicas to become healthy
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for the scaling executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub health_poll_interval: Duration,
    pub health_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            health_poll_interval: DEFAULT_HEALTH_POLL_INTERVAL,
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
        }
    }
}

/// Replica bound that stopped a scale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaBound {
    Min,
    Max,
}

/// Detailed result of one execution attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// Scale command accepted and action recorded
    Scaled {
        from: u32,
        to: u32,
        health_confirmed: bool,
    },
    /// Another execution holds the global guard
    GuardHeld,
    /// The service is already at the bound in the decision's direction
    AtBound { bound: ReplicaBound, replicas: u32 },
    /// The decision was `none`
    NoAction,
    /// The orchestrator rejected the scale command; nothing recorded
    Failed { target: u32, error: String },
}

impl ExecutionOutcome {
    pub fn is_scaled(&self) -> bool {
        matches!(self, ExecutionOutcome::Scaled { .. })
    }
}

enum HealthWait {
    Confirmed(u32),
    TimedOut(Option<u32>),
}

/// Executes scaling decisions against an orchestrator
pub struct ScalingExecutor {
    orchestrator: Arc<dyn OrchestrationClient>,
    state: Arc<ControlLoopState>,
    config: ExecutorConfig,
    metrics: AutoscalerMetrics,
    logger: StructuredLogger,
}

impl ScalingExecutor {
    pub fn new(
        orchestrator: Arc<dyn OrchestrationClient>,
        state: Arc<ControlLoopState>,
        config: ExecutorConfig,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            orchestrator,
            state,
            config,
            metrics: AutoscalerMetrics::new(),
            logger,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute `decision` for `service`; true when an action was recorded
    pub async fn execute(
        &self,
        service: &ServiceConfig,
        decision: &ScalingDecision,
        current: u32,
    ) -> bool {
        self.try_execute(service, decision, current)
            .await
            .is_scaled()
    }

    /// Execute `decision` for `service` and report exactly what happened
    pub async fn try_execute(
        &self,
        service: &ServiceConfig,
        decision: &ScalingDecision,
        current: u32,
    ) -> ExecutionOutcome {
        let name = service.name.as_str();

        if self.state.is_scaling() {
            info!(service = %name, "Scaling already in progress, skipping");
            return ExecutionOutcome::GuardHeld;
        }

        let target = match decision.action {
            ScaleDirection::Up if current >= service.max_replicas => {
                info!(service = %name, replicas = current, "Service already at max replicas");
                return ExecutionOutcome::AtBound {
                    bound: ReplicaBound::Max,
                    replicas: current,
                };
            }
            ScaleDirection::Down if current <= service.min_replicas => {
                info!(service = %name, replicas = current, "Service already at min replicas");
                return ExecutionOutcome::AtBound {
                    bound: ReplicaBound::Min,
                    replicas: current,
                };
            }
            ScaleDirection::Up => (current + 1).min(service.max_replicas),
            ScaleDirection::Down => (current - 1).max(service.min_replicas),
            ScaleDirection::None => return ExecutionOutcome::NoAction,
        };

        let Some(permit) = self.state.guard().try_acquire() else {
            info!(service = %name, "Lost race for scaling guard, skipping");
            return ExecutionOutcome::GuardHeld;
        };

        self.metrics.set_scaling_in_progress(true);
        let outcome = self.scale_and_confirm(service, decision, current, target).await;
        self.metrics.set_scaling_in_progress(false);
        drop(permit);

        outcome
    }

    async fn scale_and_confirm(
        &self,
        service: &ServiceConfig,
        decision: &ScalingDecision,
        current: u32,
        target: u32,
    ) -> ExecutionOutcome {
        let name = service.name.as_str();
        let started = Instant::now();

        info!(
            service = %name,
            action = %decision.action,
            reason = %decision.reason,
            from = current,
            to = target,
            "Scaling service"
        );

        if let Err(e) = self.orchestrator.scale(name, target).await {
            let error = e.to_string();
            self.metrics.inc_scale_operation(name, "failed");
            self.logger.log_scale_failure(name, target, &error);
            return ExecutionOutcome::Failed { target, error };
        }

        let health_confirmed = match self.wait_for_healthy(name, decision.action, target).await {
            HealthWait::Confirmed(healthy) => {
                debug!(service = %name, healthy = healthy, "New replica count confirmed healthy");
                self.metrics.inc_scale_operation(name, "confirmed");
                true
            }
            HealthWait::TimedOut(last_healthy) => {
                self.metrics.inc_scale_operation(name, "timeout");
                self.logger.log_health_timeout(name, target, last_healthy);
                false
            }
        };

        let action = ScalingAction {
            timestamp: Utc::now(),
            service: name.to_string(),
            action: decision.action,
            from_replicas: current,
            to_replicas: target,
            reason: decision.reason,
            observed_value: decision.observed_value,
            health_confirmed,
        };

        self.state.record_action(action.clone()).await;
        self.metrics.set_service_replicas(name, target);
        self.metrics
            .observe_scale_duration(name, started.elapsed().as_secs_f64());
        self.logger.log_scaling_action(&action);

        ExecutionOutcome::Scaled {
            from: current,
            to: target,
            health_confirmed,
        }
    }

    /// Poll the healthy replica count until it reaches `target` or the timeout elapses
    async fn wait_for_healthy(
        &self,
        service: &str,
        direction: ScaleDirection,
        target: u32,
    ) -> HealthWait {
        let mut last_healthy = None;

        let poll = async {
            loop {
                tokio::time::sleep(self.config.health_poll_interval).await;

                match self.orchestrator.healthy_replica_count(service).await {
                    Ok(healthy) => {
                        last_healthy = Some(healthy);
                        if target_reached(direction, healthy, target) {
                            return healthy;
                        }
                        debug!(service = %service, healthy = healthy, target = target, "Waiting for replicas");
                    }
                    Err(e) => {
                        warn!(service = %service, error = %e, "Health poll failed");
                    }
                }
            }
        };

        let result = tokio::time::timeout(self.config.health_timeout, poll).await;
        match result {
            Ok(healthy) => HealthWait::Confirmed(healthy),
            Err(_) => HealthWait::TimedOut(last_healthy),
        }
    }
}

fn target_reached(direction: ScaleDirection, healthy: u32, target: u32) -> bool {
    match direction {
        ScaleDirection::Down => healthy <= target,
        ScaleDirection::Up | ScaleDirection::None => healthy >= target,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DecisionReason, Priority, ScalingState, ServiceType};
    use crate::orchestrator::InMemoryOrchestrator;

    fn service() -> ServiceConfig {
        ServiceConfig {
            name: "web".to_string(),
            service_type: ServiceType::Web,
            priority: Priority::Medium,
            metric_names: vec!["cpu".to_string()],
            scale_up_threshold: 75.0,
            scale_down_threshold: 25.0,
            min_replicas: 2,
            max_replicas: 6,
            cooldown: Duration::from_secs(300),
        }
    }

    fn up() -> ScalingDecision {
        ScalingDecision::with_value(ScaleDirection::Up, DecisionReason::HighLoad, 90.0)
    }

    fn down() -> ScalingDecision {
        ScalingDecision::with_value(ScaleDirection::Down, DecisionReason::LowLoad, 10.0)
    }

    fn executor(orchestrator: Arc<InMemoryOrchestrator>) -> (ScalingExecutor, Arc<ControlLoopState>) {
        let state = Arc::new(ControlLoopState::new(["web"], 100));
        let executor = ScalingExecutor::new(
            orchestrator,
            state.clone(),
            ExecutorConfig::default(),
            StructuredLogger::new("test"),
        );
        (executor, state)
    }

    #[tokio::test(start_paused = true)]
    async fn test_scale_up_records_action() {
        let orchestrator = Arc::new(InMemoryOrchestrator::new().with_service("web", 2));
        let (executor, state) = executor(orchestrator.clone());

        let outcome = executor.try_execute(&service(), &up(), 2).await;

        assert_eq!(
            outcome,
            ExecutionOutcome::Scaled {
                from: 2,
                to: 3,
                health_confirmed: true
            }
        );
        assert_eq!(orchestrator.desired_replicas("web"), Some(3));

        let history = state.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].from_replicas, 2);
        assert_eq!(history[0].to_replicas, 3);
        assert_eq!(history[0].reason, DecisionReason::HighLoad);
        assert!(state.scaling_state("web").last_action_at.is_some());
        assert!(!state.is_scaling());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scale_down_records_action() {
        let orchestrator = Arc::new(InMemoryOrchestrator::new().with_service("web", 4));
        let (executor, state) = executor(orchestrator.clone());

        assert!(executor.execute(&service(), &down(), 4).await);
        assert_eq!(orchestrator.desired_replicas("web"), Some(3));
        assert_eq!(state.scaling_state("web").last_action, Some(ScaleDirection::Down));
    }

    #[tokio::test]
    async fn test_at_min_replicas_is_noop() {
        let orchestrator = Arc::new(InMemoryOrchestrator::new().with_service("web", 2));
        let (executor, state) = executor(orchestrator.clone());

        let outcome = executor.try_execute(&service(), &down(), 2).await;

        assert_eq!(
            outcome,
            ExecutionOutcome::AtBound {
                bound: ReplicaBound::Min,
                replicas: 2
            }
        );
        assert!(orchestrator.scale_calls().await.is_empty());
        assert!(state.history().await.is_empty());
        assert_eq!(state.scaling_state("web"), ScalingState::default());
    }

    #[tokio::test]
    async fn test_at_max_replicas_is_noop() {
        let orchestrator = Arc::new(InMemoryOrchestrator::new().with_service("web", 6));
        let (executor, _state) = executor(orchestrator.clone());

        assert!(!executor.execute(&service(), &up(), 6).await);
        assert!(orchestrator.scale_calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_none_decision_is_noop() {
        let orchestrator = Arc::new(InMemoryOrchestrator::new().with_service("web", 3));
        let (executor, _state) = executor(orchestrator.clone());

        let outcome = executor
            .try_execute(&service(), &ScalingDecision::none(DecisionReason::Stable), 3)
            .await;
        assert_eq!(outcome, ExecutionOutcome::NoAction);
    }

    #[tokio::test]
    async fn test_guard_held_refuses() {
        let orchestrator = Arc::new(InMemoryOrchestrator::new().with_service("web", 2));
        let (executor, state) = executor(orchestrator.clone());

        let _permit = state.guard().try_acquire().unwrap();
        let outcome = executor.try_execute(&service(), &up(), 2).await;

        assert_eq!(outcome, ExecutionOutcome::GuardHeld);
        assert!(orchestrator.scale_calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_scale_failure_releases_guard() {
        let orchestrator = Arc::new(InMemoryOrchestrator::new().with_service("web", 2));
        orchestrator.set_fail_scale(true);
        let (executor, state) = executor(orchestrator.clone());

        let outcome = executor.try_execute(&service(), &up(), 2).await;

        assert!(matches!(outcome, ExecutionOutcome::Failed { target: 3, .. }));
        assert!(!state.is_scaling());
        assert!(state.history().await.is_empty());
        assert_eq!(state.scaling_state("web"), ScalingState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_timeout_still_records() {
        let orchestrator = Arc::new(InMemoryOrchestrator::new().with_service("web", 2));
        orchestrator.set_converge(false);
        let (executor, state) = executor(orchestrator.clone());

        let started = tokio::time::Instant::now();
        let outcome = executor.try_execute(&service(), &up(), 2).await;

        assert_eq!(
            outcome,
            ExecutionOutcome::Scaled {
                from: 2,
                to: 3,
                health_confirmed: false
            }
        );
        assert!(started.elapsed() >= DEFAULT_HEALTH_TIMEOUT);

        let history = state.history().await;
        assert_eq!(history.len(), 1);
        assert!(!history[0].health_confirmed);
        assert!(!state.is_scaling());
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_held_during_execution() {
        let orchestrator = Arc::new(InMemoryOrchestrator::new().with_service("web", 2));
        orchestrator.set_converge(false);
        let (executor, state) = executor(orchestrator.clone());
        let executor = Arc::new(executor);

        let running = {
            let executor = executor.clone();
            tokio::spawn(async move { executor.try_execute(&service(), &up(), 2).await })
        };

        // Let the spawned execution reach its health poll
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(state.is_scaling());

        let second = executor.try_execute(&service(), &up(), 2).await;
        assert_eq!(second, ExecutionOutcome::GuardHeld);

        let first = running.await.unwrap();
        assert!(first.is_scaled());
        assert!(!state.is_scaling());
        assert_eq!(orchestrator.scale_calls().await.len(), 1);
    }

    #[test]
    fn test_target_reached() {
        assert!(target_reached(ScaleDirection::Up, 3, 3));
        assert!(target_reached(ScaleDirection::Up, 4, 3));
        assert!(!target_reached(ScaleDirection::Up, 2, 3));
        assert!(target_reached(ScaleDirection::Down, 2, 2));
        assert!(!target_reached(ScaleDirection::Down, 3, 2));
    }
}
