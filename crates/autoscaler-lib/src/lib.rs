//! Autoscaler library for containerized services
//!
//! This crate provides the core functionality for:
//! - Metrics collection from a Prometheus backend
//! - Threshold-based scaling decisions with per-service cooldown
//! - Scale execution against Docker Swarm or Kubernetes with health confirmation
//! - The periodic control loop and its read-only status API
//! - Self-metrics and structured logging

pub mod control_loop;
pub mod executor;
pub mod history;
pub mod metrics;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod policy;
pub mod state;
pub mod status;

pub use control_loop::{
    ControlLoop, ControlLoopBuilder, ControlLoopConfig, ServiceEvaluation, SkipReason,
};
pub use executor::{ExecutionOutcome, ExecutorConfig, ReplicaBound, ScalingExecutor};
pub use history::ScalingHistory;
pub use metrics::{MetricQuery, MetricUnit, MetricsClient, PrometheusClient};
pub use models::*;
pub use observability::{AutoscalerMetrics, StructuredLogger};
pub use orchestrator::{OrchestrationClient, OrchestrationError};
pub use policy::decide;
pub use state::{ControlLoopState, ScalingGuard, ScalingPermit};
pub use status::{create_router, HealthResponse, OverallStatus, ServiceStatus};
