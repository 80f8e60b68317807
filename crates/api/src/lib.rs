//! ECU Logger
//!
//! Wires the acquisition pipeline together and serves a read-only dashboard
//! API over the latest snapshot and the recent log rows.

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

pub mod config;
pub mod pipeline;
mod routes;
pub mod scan;
pub mod snapshot;

pub use config::{AppConfig, ConfigError};
pub use pipeline::{now_ms, Pipeline, PipelineError, StepReport};
pub use scan::{scan, ScanEntry, ScanReport};
pub use snapshot::{DashboardSnapshot, ParameterView};

use config::LoggingConfig;
use storage::Repository;
use watchdog::WatchdogStatus;

/// Application state shared across handlers
pub struct AppState {
    /// Recent log rows
    pub repository: Arc<Repository>,
    /// Latest dashboard snapshot
    pub snapshot: watch::Receiver<DashboardSnapshot>,
    /// CSV header of this run
    pub header: Vec<String>,
    /// Prometheus renderer, when the recorder is installed
    pub metrics: Option<PrometheusHandle>,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(
        repository: Arc<Repository>,
        snapshot: watch::Receiver<DashboardSnapshot>,
        header: Vec<String>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            repository,
            snapshot,
            header,
            metrics,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
        }
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: WatchdogStatus,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub last_fast_update_ms: Option<u64>,
    pub recovery_attempts: u32,
    pub rows_logged: u64,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/snapshot", get(routes::snapshot::get_snapshot))
        .route("/api/v1/log", get(routes::log::get_log))
        .route("/metrics", get(routes::metrics::get_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (watchdog, rows_logged) = {
        let snapshot = state.snapshot.borrow();
        (snapshot.watchdog.clone(), snapshot.rows_logged)
    };
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let response = HealthResponse {
        status: watchdog.status,
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        last_fast_update_ms: watchdog.last_fast_update_ms,
        recovery_attempts: watchdog.recovery_attempts,
        rows_logged,
    };

    Json(response)
}

/// Initialize logging to stderr. `RUST_LOG` wins over the configured level.
pub fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = result {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the server
pub async fn run_server(addr: &str, state: Arc<AppState>) -> std::io::Result<()> {
    let app = create_router(state);

    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
