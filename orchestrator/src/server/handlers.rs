//! HTTP request handlers

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::monitor::rollback::CycleRecord;
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "slotctl".to_string(),
        version: version.version,
    })
}

/// Version response
#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// Deployment status handler, probes both slots on every request
pub async fn status_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(state.reporter.snapshot().await)
}

/// Monitor response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorResponse {
    pub running: bool,
    pub consecutive_failures: u32,
    pub max_consecutive_failures: u32,
    pub error_threshold: f64,
    pub interval_secs: u64,
    pub last_cycle: Option<CycleRecord>,
}

/// Rollback monitor handler
pub async fn monitor_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, StatusCode> {
    let monitor = state.monitor.as_ref().ok_or(StatusCode::NOT_FOUND)?;
    let options = monitor.options();

    Ok(Json(MonitorResponse {
        running: monitor.is_running(),
        consecutive_failures: monitor.consecutive_failures(),
        max_consecutive_failures: options.max_consecutive_failures,
        error_threshold: options.error_threshold,
        interval_secs: options.interval.as_secs(),
        last_cycle: monitor.last_cycle(),
    }))
}
