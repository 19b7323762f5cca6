//! Kubernetes backend: each service is a Deployment of the same name

use super::{async_trait, OrchestrationClient, OrchestrationError};
use k8s_openapi::api::apps::v1::Deployment;
use kube::{
    api::{Api, ListParams, Patch, PatchParams},
    Client,
};
use tracing::{debug, instrument};

/// Orchestrator that scales Deployments in one namespace
pub struct KubernetesOrchestrator {
    deployments: Api<Deployment>,
    namespace: String,
}

impl KubernetesOrchestrator {
    /// Connect using the in-cluster config or the local kubeconfig
    pub async fn connect(namespace: &str) -> Result<Self, OrchestrationError> {
        let client = Client::try_default().await?;
        Ok(Self::with_client(client, namespace))
    }

    pub fn with_client(client: Client, namespace: &str) -> Self {
        Self {
            deployments: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

/// Ready replicas reported in a Deployment's status
fn ready_replicas(deployment: &Deployment) -> u32 {
    deployment
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0)
        .max(0) as u32
}

fn replicas_patch(replicas: u32) -> serde_json::Value {
    serde_json::json!({ "spec": { "replicas": replicas } })
}

#[async_trait]
impl OrchestrationClient for KubernetesOrchestrator {
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    async fn scale(&self, service: &str, replicas: u32) -> Result<(), OrchestrationError> {
        let patch = replicas_patch(replicas);
        self.deployments
            .patch(service, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| match e {
                kube::Error::Api(ref resp) if resp.code == 404 => {
                    OrchestrationError::ServiceNotFound(service.to_string())
                }
                other => OrchestrationError::Kube(other),
            })?;
        debug!("Deployment replicas patched");
        Ok(())
    }

    async fn healthy_replica_count(&self, service: &str) -> Result<u32, OrchestrationError> {
        let deployment = self
            .deployments
            .get_opt(service)
            .await?
            .ok_or_else(|| OrchestrationError::ServiceNotFound(service.to_string()))?;
        Ok(ready_replicas(&deployment))
    }

    async fn check(&self) -> Result<(), OrchestrationError> {
        self.deployments
            .list(&ListParams::default().limit(1))
            .await?;
        Ok(())
    }
}
