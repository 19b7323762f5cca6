//! HTTP status API over the control loop state
//!
//! Every endpoint is read-only and answers from in-memory state.

use crate::models::{CollectionReport, MetricSnapshot, ScaleDirection, ScalingAction};
use crate::state::ControlLoopState;
use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info};

/// History entries embedded in the `/health` response
pub const HEALTH_HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    /// The last collection produced no metrics, or none has run yet
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub name: String,
    pub replicas: Option<u32>,
    pub last_scale_action: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_action: Option<ScaleDirection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: OverallStatus,
    pub timestamp: DateTime<Utc>,
    pub services: BTreeMap<String, ServiceStatus>,
    pub metrics: MetricSnapshot,
    pub scaling_history: Vec<ScalingAction>,
    pub scaling_in_progress: bool,
    pub last_collection: Option<CollectionReport>,
}

/// Build the `/health` body from the current state
pub async fn health_report(state: &ControlLoopState) -> HealthResponse {
    let last_collection = state.last_collection().await;
    let status = match last_collection {
        Some(report) if report.has_data() => OverallStatus::Healthy,
        _ => OverallStatus::Degraded,
    };

    let services = state
        .services()
        .into_iter()
        .map(|(name, replicas)| {
            let scaling = state.scaling_state(&name);
            let status = ServiceStatus {
                name: name.clone(),
                replicas,
                last_scale_action: scaling.last_action_at,
                last_action: scaling.last_action,
            };
            (name, status)
        })
        .collect();

    HealthResponse {
        status,
        timestamp: Utc::now(),
        services,
        metrics: (*state.snapshot().await).clone(),
        scaling_history: state.recent_history(HEALTH_HISTORY_LIMIT).await,
        scaling_in_progress: state.is_scaling(),
        last_collection,
    }
}

async fn health(State(state): State<Arc<ControlLoopState>>) -> Json<HealthResponse> {
    Json(health_report(&state).await)
}

/// Latest metrics snapshot: metric -> service -> value
async fn metrics(State(state): State<Arc<ControlLoopState>>) -> Json<MetricSnapshot> {
    Json((*state.snapshot().await).clone())
}

/// Full scaling history, oldest first
async fn history(State(state): State<Arc<ControlLoopState>>) -> Json<Vec<ScalingAction>> {
    Json(state.history().await)
}

/// Autoscaler self-metrics in Prometheus text format
async fn prometheus_metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the status router
pub fn create_router(state: Arc<ControlLoopState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/history", get(history))
        .route("/prometheus", get(prometheus_metrics))
        .with_state(state)
}

/// Bind the status API listener on all interfaces
pub async fn bind(port: u16) -> anyhow::Result<TcpListener> {
    let addr = format!("0.0.0.0:{}", port);
    TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind status API on {}", addr))
}

/// Serve the status API on `listener` until `shutdown` fires
pub async fn serve(
    listener: TcpListener,
    state: Arc<ControlLoopState>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(state);

    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "Starting status API server");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    info!("Status API server stopped");
    Ok(())
}
