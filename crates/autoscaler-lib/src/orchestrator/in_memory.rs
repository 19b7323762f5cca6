//! In-memory orchestrator for dry runs and tests
//!
//! Replica counts live in a map. By default a scale request is applied and
//! immediately reported healthy; convergence and failures can be switched
//! off to exercise timeout and error paths.

use super::{async_trait, OrchestrationClient, OrchestrationError};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Default)]
struct ServiceReplicas {
    desired: u32,
    healthy: u32,
}

/// Orchestrator that keeps replica counts in memory
#[derive(Debug)]
pub struct InMemoryOrchestrator {
    services: DashMap<String, ServiceReplicas>,
    converge: AtomicBool,
    fail_scale: AtomicBool,
    scale_calls: Mutex<Vec<(String, u32)>>,
}

impl Default for InMemoryOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryOrchestrator {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
            converge: AtomicBool::new(true),
            fail_scale: AtomicBool::new(false),
            scale_calls: Mutex::new(Vec::new()),
        }
    }

    /// Register a service running `replicas` healthy replicas
    pub fn with_service(self, service: &str, replicas: u32) -> Self {
        self.set_replicas(service, replicas);
        self
    }

    /// Force both desired and healthy counts of a service
    pub fn set_replicas(&self, service: &str, replicas: u32) {
        self.services.insert(
            service.to_string(),
            ServiceReplicas {
                desired: replicas,
                healthy: replicas,
            },
        );
    }

    /// When false, scale requests change the desired count only
    pub fn set_converge(&self, converge: bool) {
        self.converge.store(converge, Ordering::SeqCst);
    }

    /// When true, every scale request fails
    pub fn set_fail_scale(&self, fail: bool) {
        self.fail_scale.store(fail, Ordering::SeqCst);
    }

    pub fn desired_replicas(&self, service: &str) -> Option<u32> {
        self.services.get(service).map(|s| s.desired)
    }

    /// Every accepted or rejected scale request, in call order
    pub async fn scale_calls(&self) -> Vec<(String, u32)> {
        self.scale_calls.lock().await.clone()
    }
}

#[async_trait]
impl OrchestrationClient for InMemoryOrchestrator {
    async fn scale(&self, service: &str, replicas: u32) -> Result<(), OrchestrationError> {
        self.scale_calls
            .lock()
            .await
            .push((service.to_string(), replicas));

        if self.fail_scale.load(Ordering::SeqCst) {
            return Err(OrchestrationError::CommandFailed {
                command: format!("scale {}={}", service, replicas),
                status: "exit status: 1".to_string(),
                stderr: "scale rejected".to_string(),
            });
        }

        let mut entry = self
            .services
            .get_mut(service)
            .ok_or_else(|| OrchestrationError::ServiceNotFound(service.to_string()))?;
        entry.desired = replicas;
        if self.converge.load(Ordering::SeqCst) {
            entry.healthy = replicas;
        }

        info!(service = %service, replicas = replicas, "In-memory service scaled");
        Ok(())
    }

    async fn healthy_replica_count(&self, service: &str) -> Result<u32, OrchestrationError> {
        self.services
            .get(service)
            .map(|s| s.healthy)
            .ok_or_else(|| OrchestrationError::ServiceNotFound(service.to_string()))
    }

    async fn check(&self) -> Result<(), OrchestrationError> {
        Ok(())
    }
}
