//! Health, status and metrics routes

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::monitor::MonitorStatus;
use crate::AppState;

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub frame_loop: ComponentHealth,
}

/// Individual component health
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub frames_processed: u64,
}

/// Status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub viewers: usize,
    #[serde(flatten)]
    pub monitor: MonitorStatus,
}

/// Health check handler
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let monitor = state.status.read().await;
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    // The HTTP side stays up after the capture ends, but reports it
    let (status, loop_status) = if monitor.running {
        ("healthy", "ok")
    } else {
        ("degraded", "stopped")
    };

    Json(HealthResponse {
        status: status.to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        frame_loop: ComponentHealth {
            status: loop_status.to_string(),
            frames_processed: monitor.frames_processed,
        },
    })
}

/// Latest analysis summary and alert counts
pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let monitor = state.status.read().await.clone();
    Json(StatusResponse {
        viewers: state.viewers.load(Ordering::Relaxed),
        monitor,
    })
}

/// Prometheus text exposition
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            "metrics recorder not installed\n".to_string(),
        ),
    }
}
