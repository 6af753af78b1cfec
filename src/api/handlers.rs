//! HTTP API handlers for the discovery endpoints.

use std::fmt;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{OriginalUri, Path, State};
use axum::http::StatusCode;
use axum::Json;
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::{debug, error};

use super::envelope::{ApiError, ApiResponse, ApiResult, ErrorResponse};
use crate::config::Config;
use crate::discovery::{
    DiscoveryService, RegistrationAck, RegistrationRequest, ServiceInstanceDto, ServiceStats,
};
use crate::error::DiscoveryError;
use crate::runtime::StartedAt;

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Configuration snapshot taken at start-up.
    pub config: Arc<Config>,
    /// Discovery facade.
    pub discovery: DiscoveryService,
    /// Process start time.
    pub started_at: StartedAt,
    /// Prometheus exporter handle, when installed.
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    /// Create new app state.
    pub fn new(config: Config, discovery: DiscoveryService, started_at: StartedAt) -> Self {
        Self {
            config: Arc::new(config),
            discovery,
            started_at,
            prometheus: None,
        }
    }

    /// Attach a Prometheus handle for `/metrics`.
    pub fn with_prometheus(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.prometheus = handle;
        self
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("app_name", &self.config.app_name)
            .field("discovery", &self.discovery)
            .field("started_at", &self.started_at)
            .field("prometheus", &self.prometheus.is_some())
            .finish()
    }
}

/// List registered services.
#[utoipa::path(
    get,
    path = "/api/v1/consul/services",
    tag = "services",
    responses(
        (status = 200, description = "Service names", body = ApiResponse<Vec<String>>),
        (status = 503, description = "Registry unreachable", body = ErrorResponse)
    )
)]
pub async fn list_services(
    State(state): State<AppState>,
    uri: OriginalUri,
) -> ApiResult<Json<ApiResponse<Vec<String>>>> {
    let services = state
        .discovery
        .list_services()
        .await
        .map_err(ApiError::at(&uri))?;

    let message = format!("Successfully retrieved {} services", services.len());
    Ok(Json(ApiResponse::success(services, message).with_path(uri.0.path())))
}

/// List registered services on a background task, falling back to defaults.
#[utoipa::path(
    get,
    path = "/api/v1/consul/services/async",
    tag = "services",
    responses(
        (status = 200, description = "Service names, or the fallback list", body = ApiResponse<Vec<String>>),
        (status = 500, description = "Background task failed", body = ErrorResponse)
    )
)]
pub async fn list_services_async(
    State(state): State<AppState>,
    uri: OriginalUri,
) -> ApiResult<Json<ApiResponse<Vec<String>>>> {
    let services = state
        .discovery
        .list_services_async()
        .await
        .map_err(|e| {
            error!(error = %e, "Service listing task failed");
            DiscoveryError::Internal(format!("service listing task failed: {}", e))
        })
        .and_then(|result| result)
        .map_err(ApiError::at(&uri))?;

    let message = format!("Successfully retrieved {} services", services.len());
    Ok(Json(ApiResponse::success(services, message).with_path(uri.0.path())))
}

/// Instances of one service.
#[utoipa::path(
    get,
    path = "/api/v1/consul/services/{name}",
    tag = "services",
    params(("name" = String, Path, description = "Service name")),
    responses(
        (status = 200, description = "Service instances", body = ApiResponse<Vec<ServiceInstanceDto>>),
        (status = 400, description = "Blank service name", body = ErrorResponse),
        (status = 404, description = "No instances registered", body = ErrorResponse),
        (status = 503, description = "Registry unreachable", body = ErrorResponse)
    )
)]
pub async fn get_service_instances(
    State(state): State<AppState>,
    Path(name): Path<String>,
    uri: OriginalUri,
) -> ApiResult<Json<ApiResponse<Vec<ServiceInstanceDto>>>> {
    let instances = state
        .discovery
        .get_service_instances(&name)
        .await
        .map_err(ApiError::at(&uri))?;

    let message = format!(
        "Successfully retrieved {} instances for service '{}'",
        instances.len(),
        name
    );
    Ok(Json(ApiResponse::success(instances, message).with_path(uri.0.path())))
}

/// Whether a service has a healthy instance.
#[utoipa::path(
    get,
    path = "/api/v1/consul/services/{name}/health",
    tag = "services",
    params(("name" = String, Path, description = "Service name")),
    responses(
        (status = 200, description = "Health flag", body = ApiResponse<bool>)
    )
)]
pub async fn service_health(
    State(state): State<AppState>,
    Path(name): Path<String>,
    uri: OriginalUri,
) -> Json<ApiResponse<bool>> {
    let healthy = state.discovery.is_service_healthy(&name).await;
    debug!(service = %name, healthy, "Service health checked");

    let message = format!(
        "Service '{}' is {}",
        name,
        if healthy { "healthy" } else { "unhealthy" }
    );
    Json(ApiResponse::success(healthy, message).with_path(uri.0.path()))
}

/// Aggregate statistics.
#[utoipa::path(
    get,
    path = "/api/v1/consul/services/stats",
    tag = "services",
    responses(
        (status = 200, description = "Service statistics", body = ApiResponse<ServiceStats>),
        (status = 503, description = "Registry unreachable", body = ErrorResponse)
    )
)]
pub async fn service_stats(
    State(state): State<AppState>,
    uri: OriginalUri,
) -> ApiResult<Json<ApiResponse<ServiceStats>>> {
    let stats = state
        .discovery
        .service_stats()
        .await
        .map_err(ApiError::at(&uri))?;

    Ok(Json(
        ApiResponse::success(stats, "Service statistics retrieved successfully")
            .with_path(uri.0.path()),
    ))
}

/// Validate a registration request. Nothing is written to the registry.
#[utoipa::path(
    post,
    path = "/api/v1/consul/register",
    tag = "services",
    request_body = RegistrationRequest,
    responses(
        (status = 201, description = "Registration accepted", body = ApiResponse<RegistrationAck>),
        (status = 400, description = "Invalid registration", body = ErrorResponse)
    )
)]
pub async fn register_service(
    State(state): State<AppState>,
    uri: OriginalUri,
    payload: Result<Json<RegistrationRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ApiResponse<RegistrationAck>>)> {
    let Json(request) = payload.map_err(|rejection| {
        let mut fields = std::collections::BTreeMap::new();
        fields.insert("body".to_string(), rejection.body_text());
        ApiError::new(DiscoveryError::Validation(fields), uri.0.path())
    })?;

    request.validate().map_err(ApiError::at(&uri))?;
    let ack = state
        .discovery
        .register(&request)
        .map_err(ApiError::at(&uri))?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(ack, "Service registered successfully").with_path(uri.0.path())),
    ))
}

/// Envelope for unmatched paths.
pub async fn not_found(uri: OriginalUri) -> ApiError {
    let path = uri.0.path().to_string();
    ApiError::new(DiscoveryError::RouteNotFound(path.clone()), path)
}
