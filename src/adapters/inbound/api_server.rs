//! Gateway Admin and Inspection API
//!
//! HTTP surface for backend administration plus the metrics inspection
//! endpoints. Requests to `v1/jmx` paths refresh the registry first
//! (debounced) so inspection sees current state.

use crate::adapters::outbound::PrometheusMetricSink;
use crate::application::{GatewayBackendService, MetricsRegistry, ReconciliationScheduler};
use crate::domain::entities::BackendConfig;
use crate::domain::ports::StoreError;
use crate::domain::value_objects::ActivationStatus;
use axum::{
    extract::{rejection::JsonRejection, Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Error body returned by every failing handler.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub registered_clusters: usize,
    pub reconciliation_running: bool,
    pub passes_started: u64,
    pub passes_completed: u64,
    pub passes_failed: u64,
}

/// Registry snapshot returned by the inspection endpoint.
#[derive(Debug, Serialize)]
pub struct ClustersResponse {
    pub clusters: BTreeMap<String, ActivationStatus>,
    pub total: usize,
}

/// Handler-facing failure, rendered as a status code and [`ErrorResponse`].
#[derive(Debug)]
enum ApiError {
    Store(StoreError),
    BadRequest(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Store(e) => {
                let status = match e {
                    StoreError::AlreadyExists(_) => StatusCode::CONFLICT,
                    StoreError::NotFound(_) => StatusCode::NOT_FOUND,
                    StoreError::Unavailable(_) | StoreError::Timeout(_) => {
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                };
                (status, e.to_string())
            }
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// API Server state.
#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<GatewayBackendService>,
    pub registry: Arc<MetricsRegistry>,
    pub scheduler: Arc<ReconciliationScheduler>,
    pub sink: Arc<PrometheusMetricSink>,
}

impl ApiState {
    pub fn new(
        service: Arc<GatewayBackendService>,
        scheduler: Arc<ReconciliationScheduler>,
        sink: Arc<PrometheusMetricSink>,
    ) -> Self {
        Self {
            service,
            registry: scheduler.registry().clone(),
            scheduler,
            sink,
        }
    }
}

/// Build the full router over `state`.
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        // Administration
        .route("/gateway/backend/modify/add", post(add_backend_handler))
        .route("/gateway/backend/modify/update", post(update_backend_handler))
        .route("/gateway/backend/modify/delete", post(delete_backend_handler))
        .route("/gateway/backend/activate/:name", post(activate_handler))
        .route("/gateway/backend/deactivate/:name", post(deactivate_handler))
        .route("/entity/backends", get(list_backends_handler))
        .route("/entity/backends/active", get(list_active_handler))
        .route(
            "/entity/backends/active/:routing_group",
            get(list_active_by_group_handler),
        )
        .route("/entity/backends/:name", get(get_backend_handler))
        // Inspection
        .route("/v1/jmx/clusters", get(clusters_handler))
        .route("/metrics", get(prometheus_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inspection_refresh,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// API Server for administration and inspection.
pub struct ApiServer {
    listen_addr: String,
    state: ApiState,
}

impl ApiServer {
    pub fn new(listen_addr: String, state: ApiState) -> Self {
        Self { listen_addr, state }
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    #[cfg_attr(coverage_nightly, coverage(off))]
    pub async fn run<F>(&self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(&self.listen_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!("gateway API listening on {}", listener.local_addr()?);
        axum::serve(listener, create_router(self.state.clone()))
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

/// Refreshes the registry before any `v1/jmx` request is served.
async fn inspection_refresh(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Response {
    if request.uri().path().contains("v1/jmx") {
        state.scheduler.trigger_on_access().await;
    }
    next.run(request).await
}

// Handler functions

async fn health_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let stats = state.scheduler.stats();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        registered_clusters: state.registry.len().await,
        reconciliation_running: state.scheduler.is_running(),
        passes_started: stats.passes_started,
        passes_completed: stats.passes_completed,
        passes_failed: stats.passes_failed,
    })
}

fn json_body(
    payload: Result<Json<BackendConfig>, JsonRejection>,
) -> Result<BackendConfig, ApiError> {
    payload
        .map(|Json(backend)| backend)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

async fn add_backend_handler(
    State(state): State<ApiState>,
    payload: Result<Json<BackendConfig>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let backend = json_body(payload)?;
    let created = state.service.add_backend(&backend).await?;
    Ok(Json(created))
}

async fn update_backend_handler(
    State(state): State<ApiState>,
    payload: Result<Json<BackendConfig>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let backend = json_body(payload)?;
    let updated = state.service.update_backend(&backend).await?;
    Ok(Json(updated))
}

/// Accepts the backend name as plain text or as a JSON string.
fn backend_name_from_body(body: &str) -> Result<String, ApiError> {
    let trimmed = body.trim();
    let name = if trimmed.starts_with('"') {
        serde_json::from_str::<String>(trimmed)
            .map_err(|e| ApiError::BadRequest(format!("invalid backend name: {}", e)))?
    } else {
        trimmed.to_string()
    };
    if name.is_empty() {
        return Err(ApiError::BadRequest("backend name is required".to_string()));
    }
    Ok(name)
}

async fn delete_backend_handler(
    State(state): State<ApiState>,
    body: String,
) -> Result<impl IntoResponse, ApiError> {
    let name = backend_name_from_body(&body)?;
    state.service.delete_backend(&name).await?;
    Ok(Json(serde_json::json!({
        "name": name,
        "deleted": true
    })))
}

async fn activate_handler(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.service.activate_backend(&name).await?;
    Ok(Json(serde_json::json!({ "name": name, "active": true })))
}

async fn deactivate_handler(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.service.deactivate_backend(&name).await?;
    Ok(Json(serde_json::json!({ "name": name, "active": false })))
}

async fn list_backends_handler(
    State(state): State<ApiState>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.get_all_backends().await?))
}

async fn list_active_handler(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.get_all_active_backends().await?))
}

async fn list_active_by_group_handler(
    State(state): State<ApiState>,
    Path(routing_group): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.get_active_backends(&routing_group).await?))
}

async fn get_backend_handler(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match state.service.get_backend_by_name(&name).await? {
        Some(backend) => Ok(Json(backend)),
        None => Err(StoreError::NotFound(name).into()),
    }
}

async fn clusters_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let clusters = state.registry.snapshot().await;
    let total = clusters.len();
    Json(ClustersResponse { clusters, total })
}

async fn prometheus_handler(State(state): State<ApiState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.sink.export_prometheus().await,
    )
}
