//! Container orchestrator backends
//!
//! The control loop only needs two operations from an orchestrator: request a
//! replica count for a service, and report how many replicas of it are
//! currently healthy. Docker Swarm, Kubernetes and an in-memory backend
//! implement [`OrchestrationClient`].

mod in_memory;
mod kubernetes;
mod swarm;

pub use in_memory::InMemoryOrchestrator;
pub use kubernetes::KubernetesOrchestrator;
pub use swarm::{count_running_tasks, SwarmOrchestrator};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use async_trait::async_trait;

/// Errors returned by orchestrator backends
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("unexpected orchestrator output: {0}")]
    UnexpectedOutput(String),

    #[error("service {0} not found")]
    ServiceNotFound(String),

    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

/// Which orchestrator backend drives the services
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrchestratorKind {
    #[default]
    Swarm,
    Kubernetes,
    Static,
}

impl fmt::Display for OrchestratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorKind::Swarm => f.write_str("swarm"),
            OrchestratorKind::Kubernetes => f.write_str("kubernetes"),
            OrchestratorKind::Static => f.write_str("static"),
        }
    }
}

/// Trait for orchestrator implementations
#[async_trait]
pub trait OrchestrationClient: Send + Sync {
    /// Request `replicas` running replicas of `service`. Returns once the
    /// orchestrator accepted the command, not once replicas are healthy.
    async fn scale(&self, service: &str, replicas: u32) -> Result<(), OrchestrationError>;

    /// Number of replicas of `service` currently running and healthy
    async fn healthy_replica_count(&self, service: &str) -> Result<u32, OrchestrationError>;

    /// Verify the orchestrator is reachable
    async fn check(&self) -> Result<(), OrchestrationError>;
}
