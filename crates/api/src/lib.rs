//! Driver Drowsiness Monitor Server
//!
//! Runs the frame loop and serves the annotated camera stream to browsers.

use alerting::{AlertDispatcher, BellSink};
use axum::{routing::get, Router};
use camera_capture::{CameraError, Frames};
use dms::{DmsError, DmsModule};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::str::FromStr;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

pub mod config;
pub mod monitor;
pub mod render;
mod routes;

pub use crate::config::{LogFormat, ServerConfig, Settings};
pub use crate::monitor::{FramePublisher, FrameSubscriber, LoopOptions, Monitor, MonitorStatus, SharedStatus};

/// Service error types
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Metrics setup failed: {0}")]
    Metrics(String),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("DMS error: {0}")]
    Dms(#[from] DmsError),

    #[error("JPEG encoding failed: {0}")]
    Encode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state shared across handlers
pub struct AppState {
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: std::time::Instant,
    /// Latest encoded frame
    pub frames: FrameSubscriber,
    /// Frame loop status
    pub status: SharedStatus,
    /// Connected stream viewers
    pub viewers: Arc<AtomicUsize>,
    /// Prometheus handle, when a recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create new application state
    pub fn new(frames: FrameSubscriber, status: SharedStatus, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
            frames,
            status,
            viewers: Arc::new(AtomicUsize::new(0)),
            metrics,
        }
    }
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(routes::stream::index))
        .route("/video_feed", get(routes::stream::video_feed))
        .route("/api/v1/health", get(routes::status::health))
        .route("/api/v1/status", get(routes::status::status))
        .route("/metrics", get(routes::status::metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Initialize logging
pub fn init_logging(server: &ServerConfig) -> Result<(), ApiError> {
    let level = Level::from_str(&server.log_level)
        .map_err(|_| ApiError::Logging(format!("unknown log level '{}'", server.log_level)))?;

    let result = match server.log_format {
        LogFormat::Text => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_target(true)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
        }
        LogFormat::Json => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_target(true)
                .json()
                .finish();
            tracing::subscriber::set_global_default(subscriber)
        }
    };
    result.map_err(|e| ApiError::Logging(e.to_string()))
}

/// Load models, open the camera, start the frame loop and serve until shutdown.
///
/// Everything before the bind is fatal on failure.
pub async fn run_server(settings: Settings) -> Result<(), ApiError> {
    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ApiError::Metrics(e.to_string()))?;

    let dms = DmsModule::new(settings.dms.clone())?;
    info!("Models loaded");

    let source = settings.camera.open()?;
    info!("Camera opened: {:?} {}", settings.camera.source, settings.camera.path.display());

    let (publisher, frames) = watch::channel(None);
    let status = SharedStatus::default();
    let monitor = Monitor::new(
        Frames::new(source),
        dms,
        AlertDispatcher::new(Box::new(BellSink::new(settings.tone.clone()))),
        LoopOptions {
            frame_scale: settings.camera.frame_scale,
            jpeg_quality: settings.server.jpeg_quality,
        },
        publisher,
        status.clone(),
    );
    let _frame_loop = monitor.spawn()?;

    let state = Arc::new(AppState::new(frames, status, Some(metrics)));
    let app = create_router(state);

    info!("Starting stream server on {}", settings.server.addr);

    let listener = tokio::net::TcpListener::bind(&settings.server.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
