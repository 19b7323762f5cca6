//! Replica autoscaler
//!
//! Watches per-service load in Prometheus and scales Docker Swarm services
//! or Kubernetes Deployments one replica at a time.

use anyhow::{Context, Result};
use autoscaler_lib::{
    orchestrator::{
        InMemoryOrchestrator, KubernetesOrchestrator, OrchestratorKind, SwarmOrchestrator,
    },
    status, ControlLoopBuilder, MetricsClient, OrchestrationClient, PrometheusClient,
    ServiceConfig, StructuredLogger,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const AUTOSCALER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting autoscaler");

    let config = config::AutoscalerConfig::load()?;
    let services = config.services()?;
    info!(
        instance = %config.instance,
        services = services.len(),
        backend = %config.orchestrator.backend,
        prometheus_url = %config.prometheus_url,
        "Autoscaler configured"
    );

    let metrics_client = Arc::new(PrometheusClient::new(
        &config.prometheus_url,
        config.queries.clone(),
        config.service_label.clone(),
        config.query_timeout(),
    )?);
    let orchestrator = build_orchestrator(&config, &services).await?;

    // Both backends must be reachable before the loop starts
    metrics_client
        .check()
        .await
        .context("Metrics backend is unreachable")?;
    orchestrator
        .check()
        .await
        .context("Orchestrator is unreachable")?;

    let logger = StructuredLogger::new(&config.instance);
    logger.log_startup(
        AUTOSCALER_VERSION,
        &config.orchestrator.backend.to_string(),
        services.len(),
    );

    let control_loop = Arc::new(
        ControlLoopBuilder::new()
            .services(services)
            .metrics_client(metrics_client)
            .orchestrator(orchestrator)
            .metrics_period(config.metrics_period())
            .evaluation_period(config.evaluation_period())
            .health_poll_interval(config.health_poll_interval())
            .health_timeout(config.health_timeout())
            .history_capacity(config.history_capacity)
            .logger(logger.clone())
            .build()?,
    );

    let listener = status::bind(config.api_port).await?;

    let (shutdown_tx, _) = broadcast::channel(1);

    let api_handle = tokio::spawn(status::serve(
        listener,
        control_loop.state(),
        shutdown_tx.subscribe(),
    ));
    let loop_handles = control_loop.spawn(&shutdown_tx);

    let reason = shutdown_signal().await?;
    logger.log_shutdown(reason);
    info!("Shutting down");

    let _ = shutdown_tx.send(());

    let drain = async {
        for handle in loop_handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Control loop task failed");
            }
        }
    };
    if tokio::time::timeout(config.shutdown_grace(), drain).await.is_err() {
        warn!(
            grace_secs = config.shutdown_grace_secs,
            "Control loop did not stop within the grace period"
        );
    }

    match api_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Status API server failed"),
        Err(e) => error!(error = %e, "Status API task failed"),
    }

    Ok(())
}

/// Wait for SIGINT or, on unix, SIGTERM
async fn shutdown_signal() -> Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                Ok("SIGINT received")
            }
            _ = terminate.recv() => Ok("SIGTERM received"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("SIGINT received")
    }
}

async fn build_orchestrator(
    config: &config::AutoscalerConfig,
    services: &[ServiceConfig],
) -> Result<Arc<dyn OrchestrationClient>> {
    let orchestrator: Arc<dyn OrchestrationClient> = match config.orchestrator.backend {
        OrchestratorKind::Swarm => Arc::new(SwarmOrchestrator::new(
            config.orchestrator.docker_binary.clone(),
        )),
        OrchestratorKind::Kubernetes => Arc::new(
            KubernetesOrchestrator::connect(&config.orchestrator.namespace)
                .await
                .context("Failed to create Kubernetes client")?,
        ),
        OrchestratorKind::Static => {
            let orchestrator = InMemoryOrchestrator::new();
            for service in services {
                orchestrator.set_replicas(&service.name, service.min_replicas);
            }
            Arc::new(orchestrator)
        }
    };
    Ok(orchestrator)
}
