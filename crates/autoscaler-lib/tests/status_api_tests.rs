//! Status API responses over a hand-built control loop state

use autoscaler_lib::{
    create_router, AutoscalerMetrics, CollectionReport, ControlLoopState, DecisionReason,
    MetricSnapshot, ScaleDirection, ScalingAction,
};
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower::ServiceExt;

fn snapshot() -> MetricSnapshot {
    let mut snapshot = MetricSnapshot::new();
    let mut cpu = BTreeMap::new();
    cpu.insert("web".to_string(), 82.5);
    cpu.insert("api".to_string(), 40.0);
    snapshot.insert_metric("cpu", cpu);
    snapshot
}

fn action(service: &str, minutes_ago: i64, from: u32, to: u32) -> ScalingAction {
    ScalingAction {
        timestamp: Utc::now() - ChronoDuration::minutes(minutes_ago),
        service: service.to_string(),
        action: if to > from {
            ScaleDirection::Up
        } else {
            ScaleDirection::Down
        },
        from_replicas: from,
        to_replicas: to,
        reason: if to > from {
            DecisionReason::HighLoad
        } else {
            DecisionReason::LowLoad
        },
        observed_value: Some(82.5),
        health_confirmed: true,
    }
}

async fn populated_state() -> Arc<ControlLoopState> {
    let state = Arc::new(ControlLoopState::new(["web", "api"], 100));
    let report = CollectionReport {
        collected_at: Utc::now(),
        metrics_collected: 1,
        metrics_configured: 2,
    };
    state.replace_snapshot(snapshot(), report).await;
    state.set_replicas("api", 2);
    state.record_action(action("web", 5, 2, 3)).await;
    state
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_health_reports_services_and_history() {
    let app = create_router(populated_state().await);

    let (status, body) = get_json(app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body["timestamp"].is_string());
    assert_eq!(body["services"]["web"]["name"], "web");
    assert_eq!(body["services"]["web"]["replicas"], 3);
    assert!(body["services"]["web"]["lastScaleAction"].is_string());
    assert_eq!(body["services"]["api"]["replicas"], 2);
    assert!(body["services"]["api"]["lastScaleAction"].is_null());
    assert_eq!(body["metrics"]["cpu"]["web"], 82.5);
    assert_eq!(body["scalingHistory"].as_array().unwrap().len(), 1);
    assert_eq!(body["scalingHistory"][0]["fromReplicas"], 2);
    assert_eq!(body["scalingHistory"][0]["toReplicas"], 3);
    assert_eq!(body["scalingInProgress"], false);
}

#[tokio::test]
async fn test_health_is_degraded_before_first_collection() {
    let state = Arc::new(ControlLoopState::new(["web"], 100));
    let app = create_router(state);

    let (status, body) = get_json(app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert!(body["services"]["web"]["replicas"].is_null());
    assert_eq!(body["metrics"], serde_json::json!({}));
    assert_eq!(body["scalingHistory"], serde_json::json!([]));
}

#[tokio::test]
async fn test_health_is_degraded_after_empty_collection() {
    let state = Arc::new(ControlLoopState::new(["web"], 100));
    let report = CollectionReport {
        collected_at: Utc::now(),
        metrics_collected: 0,
        metrics_configured: 2,
    };
    state.replace_snapshot(MetricSnapshot::new(), report).await;

    let (_, body) = get_json(create_router(state), "/health").await;
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn test_health_history_limited_to_last_ten() {
    let state = Arc::new(ControlLoopState::new(["web"], 100));
    for i in 0..15u32 {
        state.record_action(action("web", 60 - i as i64, i + 1, i + 2)).await;
    }

    let (_, body) = get_json(create_router(state.clone()), "/health").await;
    let history = body["scalingHistory"].as_array().unwrap();
    assert_eq!(history.len(), 10);
    assert_eq!(history[0]["fromReplicas"], 6);
    assert_eq!(history[9]["fromReplicas"], 15);

    let (_, body) = get_json(create_router(state), "/history").await;
    assert_eq!(body.as_array().unwrap().len(), 15);
}

#[tokio::test]
async fn test_metrics_returns_snapshot() {
    let app = create_router(populated_state().await);

    let (status, body) = get_json(app, "/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({"cpu": {"api": 40.0, "web": 82.5}}));
}

#[tokio::test]
async fn test_history_returns_actions() {
    let app = create_router(populated_state().await);

    let (status, body) = get_json(app, "/history").await;

    assert_eq!(status, StatusCode::OK);
    let history = body.as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["service"], "web");
    assert_eq!(history[0]["action"], "up");
    assert_eq!(history[0]["reason"], "high-load");
    assert_eq!(history[0]["observedValue"], 82.5);
    assert_eq!(history[0]["healthConfirmed"], true);
}

#[tokio::test]
async fn test_prometheus_exposes_self_metrics() {
    let metrics = AutoscalerMetrics::new();
    metrics.set_service_replicas("web", 3);

    let app = create_router(populated_state().await);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/prometheus")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("autoscaler_service_replicas"));
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = create_router(populated_state().await);
    let response = app
        .oneshot(Request::builder().uri("/scale").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bind_fails_when_port_in_use() {
    let held = autoscaler_lib::status::bind(0).await.unwrap();
    let port = held.local_addr().unwrap().port();

    let err = autoscaler_lib::status::bind(port).await.unwrap_err();
    assert!(err.to_string().contains("Failed to bind status API"));
}

#[tokio::test]
async fn test_serve_answers_until_shutdown() {
    let listener = autoscaler_lib::status::bind(0).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let server = tokio::spawn(autoscaler_lib::status::serve(
        listener,
        populated_state().await,
        shutdown_tx.subscribe(),
    ));

    let response = reqwest::get(format!("http://127.0.0.1:{}/health", port))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(5), server)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
}
