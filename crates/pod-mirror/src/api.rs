//! HTTP API for health checks, Prometheus metrics and read-only pod queries

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use podsync_lib::{
    health::{ComponentStatus, HealthRegistry},
    LogEntry, Metric, Pod, RegistryView,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub views: watch::Receiver<Arc<RegistryView>>,
    pub health_registry: HealthRegistry,
}

impl AppState {
    pub fn new(views: watch::Receiver<Arc<RegistryView>>, health_registry: HealthRegistry) -> Self {
        Self {
            views,
            health_registry,
        }
    }

    fn view(&self) -> Arc<RegistryView> {
        Arc::clone(&self.views.borrow())
    }
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    initialized: bool,
    version: u64,
    pods: usize,
    served_at: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    tail: Option<usize>,
}

fn not_found(what: impl Into<String>) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse { error: what.into() }),
    )
        .into_response()
}

fn owned(pods: Vec<Arc<Pod>>) -> Vec<Pod> {
    pods.iter().map(|pod| Pod::clone(pod)).collect()
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still serving the last snapshot
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 once the first snapshot is loaded
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint; the sync task keeps the gauges current
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let view = state.view();
    Json(StatusResponse {
        initialized: view.is_initialized(),
        version: view.version(),
        pods: view.pod_count(),
        served_at: chrono::Utc::now().to_rfc3339(),
    })
}

async fn list_pods(State(state): State<Arc<AppState>>) -> Json<Vec<Pod>> {
    Json(owned(state.view().all_pods()))
}

async fn active_pods(State(state): State<Arc<AppState>>) -> Json<Vec<Pod>> {
    Json(owned(state.view().running_pods()))
}

async fn stopped_pods(State(state): State<Arc<AppState>>) -> Json<Vec<Pod>> {
    Json(owned(state.view().stopped_pods()))
}

async fn get_pod(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.view().pod(&id) {
        Some(pod) => Json(Pod::clone(&pod)).into_response(),
        None => not_found(format!("Pod {} not found", id)),
    }
}

async fn pod_history(
    State(state): State<Arc<AppState>>,
    Path((id, metric)): Path<(String, String)>,
) -> Response {
    let Some(metric) = Metric::parse(&metric) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("Unknown metric {}", metric),
            }),
        )
            .into_response();
    };

    let view = state.view();
    if view.pod(&id).is_none() {
        return not_found(format!("Pod {} not found", id));
    }

    let samples: Vec<f64> = view.history(&id, metric).iter().copied().collect();
    Json(samples).into_response()
}

async fn pod_logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Response {
    let view = state.view();
    if view.pod(&id).is_none() {
        return not_found(format!("Pod {} not found", id));
    }

    let logs = view.logs(&id);
    let skip = query
        .tail
        .map(|tail| logs.len().saturating_sub(tail))
        .unwrap_or(0);
    let entries: Vec<LogEntry> = logs[skip..].to_vec();
    Json(entries).into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/status", get(status))
        .route("/pods", get(list_pods))
        .route("/pods/active", get(active_pods))
        .route("/pods/stopped", get(stopped_pods))
        .route("/pods/:id", get(get_pod))
        .route("/pods/:id/history/:metric", get(pod_history))
        .route("/pods/:id/logs", get(pod_logs))
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
