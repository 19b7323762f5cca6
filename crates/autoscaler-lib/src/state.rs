//! Shared runtime state of the control loop
//!
//! One `ControlLoopState` is created at startup and handed by `Arc` to the
//! metrics task, the evaluation task, the executor and the status server.

use crate::history::ScalingHistory;
use crate::models::{CollectionReport, MetricSnapshot, ScalingAction, ScalingState};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Global mutual-exclusion flag for scale executions across all services
#[derive(Debug, Clone, Default)]
pub struct ScalingGuard {
    scaling: Arc<AtomicBool>,
}

impl ScalingGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take the guard; `None` if another execution holds it
    pub fn try_acquire(&self) -> Option<ScalingPermit> {
        self.scaling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ScalingPermit {
                scaling: Arc::clone(&self.scaling),
            })
    }

    pub fn is_scaling(&self) -> bool {
        self.scaling.load(Ordering::Acquire)
    }
}

/// Held for the duration of one scale execution; releases the guard on drop
#[derive(Debug)]
pub struct ScalingPermit {
    scaling: Arc<AtomicBool>,
}

impl Drop for ScalingPermit {
    fn drop(&mut self) {
        self.scaling.store(false, Ordering::Release);
    }
}

/// Runtime state shared by every control loop component
#[derive(Debug)]
pub struct ControlLoopState {
    snapshot: RwLock<Arc<MetricSnapshot>>,
    last_collection: RwLock<Option<CollectionReport>>,
    scaling: DashMap<String, ScalingState>,
    replicas: DashMap<String, Option<u32>>,
    history: RwLock<ScalingHistory>,
    guard: ScalingGuard,
}

impl ControlLoopState {
    /// Create state for the given services with an empty snapshot and history
    pub fn new<I, S>(services: I, history_capacity: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let replicas = DashMap::new();
        for service in services {
            replicas.insert(service.into(), None);
        }

        Self {
            snapshot: RwLock::new(Arc::new(MetricSnapshot::new())),
            last_collection: RwLock::new(None),
            scaling: DashMap::new(),
            replicas,
            history: RwLock::new(ScalingHistory::with_capacity(history_capacity)),
            guard: ScalingGuard::new(),
        }
    }

    /// Latest fully committed snapshot
    pub async fn snapshot(&self) -> Arc<MetricSnapshot> {
        Arc::clone(&*self.snapshot.read().await)
    }

    /// Replace the snapshot wholesale and remember how the collection went
    pub async fn replace_snapshot(&self, snapshot: MetricSnapshot, report: CollectionReport) {
        *self.snapshot.write().await = Arc::new(snapshot);
        *self.last_collection.write().await = Some(report);
    }

    pub async fn last_collection(&self) -> Option<CollectionReport> {
        *self.last_collection.read().await
    }

    pub fn scaling_state(&self, service: &str) -> ScalingState {
        self.scaling
            .get(service)
            .map(|entry| *entry.value())
            .unwrap_or_default()
    }

    /// Record the replica count last observed for a service
    pub fn set_replicas(&self, service: &str, replicas: u32) {
        self.replicas.insert(service.to_string(), Some(replicas));
    }

    pub fn replicas(&self, service: &str) -> Option<u32> {
        self.replicas.get(service).and_then(|entry| *entry.value())
    }

    /// Services known to the loop with their last observed replica count, sorted by name
    pub fn services(&self) -> Vec<(String, Option<u32>)> {
        let mut services: Vec<_> = self
            .replicas
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        services.sort_by(|a, b| a.0.cmp(&b.0));
        services
    }

    /// Commit an executed action: cooldown timestamp, replica count and history entry
    pub async fn record_action(&self, action: ScalingAction) {
        self.scaling.insert(
            action.service.clone(),
            ScalingState {
                last_action_at: Some(action.timestamp),
                last_action: Some(action.action),
            },
        );
        self.set_replicas(&action.service, action.to_replicas);
        self.history.write().await.push(action);
    }

    /// Full history, oldest first
    pub async fn history(&self) -> Vec<ScalingAction> {
        self.history.read().await.entries()
    }

    /// The `limit` most recent actions, oldest first
    pub async fn recent_history(&self, limit: usize) -> Vec<ScalingAction> {
        self.history.read().await.recent(limit)
    }

    pub fn guard(&self) -> &ScalingGuard {
        &self.guard
    }

    pub fn is_scaling(&self) -> bool {
        self.guard.is_scaling()
    }
}
