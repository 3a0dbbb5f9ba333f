//! HTTP API for health checks, Prometheus metrics and the live view

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use monitor_lib::{
    health::{ComponentStatus, HealthRegistry},
    observability::MonitorMetrics,
    publisher::{LiveFrame, MetricKind, MetricSeries},
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: MonitorMetrics,
    pub live: watch::Receiver<LiveFrame>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: MonitorMetrics,
        live: watch::Receiver<LiveFrame>,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            live,
        }
    }
}

/// One metric across every tracked pod
#[derive(Debug, Serialize)]
struct MetricView {
    metric: MetricKind,
    unit: &'static str,
    series: Vec<MetricSeries>,
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still sampling
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 while the scheduler runs
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.encode() {
        Ok(buffer) => (
            StatusCode::OK,
            [("content-type", prometheus::TEXT_FORMAT)],
            buffer,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Latest frame of every rolling window
async fn live(State(state): State<Arc<AppState>>) -> Json<LiveFrame> {
    Json(state.live.borrow().clone())
}

async fn live_cpu(State(state): State<Arc<AppState>>) -> Json<MetricView> {
    Json(metric_view(&state, MetricKind::Cpu))
}

async fn live_memory(State(state): State<Arc<AppState>>) -> Json<MetricView> {
    Json(metric_view(&state, MetricKind::Memory))
}

fn metric_view(state: &AppState, metric: MetricKind) -> MetricView {
    MetricView {
        metric,
        unit: metric.unit(),
        series: state.live.borrow().metric_view(metric),
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/live", get(live))
        .route("/live/cpu", get(live_cpu))
        .route("/live/memory", get(live_memory))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
