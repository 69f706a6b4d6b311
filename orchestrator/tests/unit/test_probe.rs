//! HTTP health probe tests against a local backend

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;

use slotctl::http::probe::{HealthProbe, HttpHealthProbe};
use slotctl::models::health::HealthStatus;
use slotctl::models::slot::Slot;
use slotctl::monitor::error_rate::{ErrorRateEstimator, HealthErrorRateEstimator};
use slotctl::storage::settings::{MonitorSettings, SlotEndpoint, SlotsSettings};

const TIMEOUT: Duration = Duration::from_millis(500);

async fn spawn_backend() -> SocketAddr {
    let app = Router::new()
        .route(
            "/health",
            get(|| async { Json(json!({"status": "healthy", "database": "connected", "service": "api"})) }),
        )
        .route(
            "/down",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"status": "unhealthy"}))) }),
        )
        .route(
            "/degraded",
            get(|| async { Json(json!({"status": "degraded", "database": "disconnected"})) }),
        )
        .route(
            "/sluggish",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(400)).await;
                Json(json!({"status": "healthy", "database": "connected"}))
            }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({"status": "healthy"}))
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn endpoint(port: u16, path: &str) -> SlotEndpoint {
    SlotEndpoint {
        host: "127.0.0.1".to_string(),
        port,
        health_path: path.to_string(),
    }
}

fn probe_for(blue: SlotEndpoint, green: SlotEndpoint) -> HttpHealthProbe {
    HttpHealthProbe::new(SlotsSettings { blue, green }).unwrap()
}

#[tokio::test]
async fn test_probe_classifies_responses() {
    let addr = spawn_backend().await;
    let probe = probe_for(endpoint(addr.port(), "/health"), endpoint(addr.port(), "/down"));

    let blue = probe.probe(Slot::Blue, TIMEOUT).await;
    assert_eq!(blue.status, HealthStatus::Healthy);
    assert_eq!(blue.http_status_code, Some(200));
    assert_eq!(blue.payload.unwrap().service.as_deref(), Some("api"));

    let green = probe.probe(Slot::Green, TIMEOUT).await;
    assert_eq!(green.status, HealthStatus::Unhealthy);
    assert_eq!(green.http_status_code, Some(503));
}

#[tokio::test]
async fn test_probe_self_reported_degraded() {
    let addr = spawn_backend().await;
    let probe = probe_for(endpoint(addr.port(), "/degraded"), endpoint(addr.port(), "/health"));

    let result = probe.probe(Slot::Blue, TIMEOUT).await;
    assert_eq!(result.status, HealthStatus::Unhealthy);
    assert_eq!(result.http_status_code, Some(200));
    assert!(result.payload.unwrap().database_disconnected());
}

#[tokio::test]
async fn test_probe_timeout_is_unreachable() {
    let addr = spawn_backend().await;
    let probe = probe_for(endpoint(addr.port(), "/health"), endpoint(addr.port(), "/slow"));

    let result = probe.probe(Slot::Green, Duration::from_millis(100)).await;
    assert_eq!(result.status, HealthStatus::Unreachable);
    assert!(result.http_status_code.is_none());
    assert!(result.error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_probe_closed_port_is_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let probe = probe_for(endpoint(port, "/health"), endpoint(port, "/health"));
    let result = probe.probe(Slot::Blue, TIMEOUT).await;
    assert_eq!(result.status, HealthStatus::Unreachable);
    assert!(result.error.is_some());
}

#[tokio::test]
async fn test_slow_healthy_answer_scores_as_slow() {
    let addr = spawn_backend().await;
    let probe = probe_for(endpoint(addr.port(), "/sluggish"), endpoint(addr.port(), "/health"));
    let settings = MonitorSettings {
        slow_response_ms: 200,
        probe_timeout_ms: 2000,
        ..Default::default()
    };
    let estimator = HealthErrorRateEstimator::new(Arc::new(probe), &settings);

    let slow = estimator.estimate(Slot::Blue).await;
    assert_eq!(slow.rate, 0.3, "{}", slow.reason);

    let fast = estimator.estimate(Slot::Green).await;
    assert_eq!(fast.rate, 0.0, "{}", fast.reason);
}
