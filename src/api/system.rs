//! Health, info, metrics and configuration endpoints.

use std::collections::BTreeMap;

use axum::extract::{OriginalUri, Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use super::envelope::{ApiError, ApiResponse, ApiResult, ErrorResponse};
use super::handlers::AppState;
use crate::config::Config;
use crate::error::DiscoveryError;
use crate::runtime::RuntimeSnapshot;

/// Per-component check results.
pub type Checks = BTreeMap<String, String>;

/// Body of `GET /api/v1/health`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: String,
    pub service: String,
    pub port: u16,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_minutes: u64,
    /// `application`, `consul`, `circuitBreaker`, `diskSpace`, `memory`.
    pub checks: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSection {
    pub name: String,
    pub version: String,
    pub description: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSection {
    pub active_profiles: Vec<String>,
    pub os_name: String,
    pub os_version: String,
    pub kernel_version: String,
    pub arch: String,
    pub hostname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSection {
    pub start_time: DateTime<Utc>,
    pub uptime_minutes: u64,
    pub available_processors: usize,
    pub total_memory_mb: u64,
    pub used_memory_mb: u64,
    pub free_memory_mb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConsulSection {
    pub host: String,
    pub port: u16,
    pub discovery_enabled: bool,
    pub config_enabled: bool,
    pub registry: String,
}

/// Body of `GET /api/v1/info`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AppInfo {
    pub application: ApplicationSection,
    pub environment: EnvironmentSection,
    pub runtime: RuntimeSection,
    pub consul: ConsulSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemoryFigures {
    pub total_mb: u64,
    pub used_mb: u64,
    pub free_mb: u64,
    pub usage_percent: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UptimeFigures {
    pub start_time: DateTime<Utc>,
    pub current_time: DateTime<Utc>,
    pub uptime_minutes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SystemFigures {
    pub available_processors: usize,
    pub hostname: String,
    pub os_name: String,
    pub disk_total_mb: u64,
    pub disk_available_mb: u64,
}

/// Body of `GET /api/v1/metrics/custom` (not enveloped).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CustomMetrics {
    pub memory: MemoryFigures,
    pub uptime: UptimeFigures,
    pub system: SystemFigures,
}

/// Body of `GET /api/v1/metrics/status` (not enveloped).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusReport {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub checks: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PropertyValue {
    pub key: String,
    pub value: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ContactSection {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSection {
    pub host: String,
    pub port: u16,
    /// `CONNECTED` or `DISCONNECTED`.
    pub connection_status: String,
}

/// Body of `GET /api/v1/config/info`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConfigInfo {
    pub application: ApplicationSection,
    pub environment: EnvironmentSection,
    pub consul: ConnectionSection,
    pub contact: ContactSection,
    pub timestamp: DateTime<Utc>,
}

/// Body of `POST /api/v1/config/refresh`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshReport {
    pub status: String,
    /// Keys whose environment value differs from the running configuration.
    pub changed_keys: Vec<String>,
    /// Always false: changes take effect on restart.
    pub applied: bool,
    pub timestamp: DateTime<Utc>,
    pub next_check: DateTime<Utc>,
}

/// Body of `GET /api/v1/config/profiles`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProfilesInfo {
    pub active: Vec<String>,
    pub default: Vec<String>,
    pub count: usize,
    pub timestamp: DateTime<Utc>,
}

fn application_section(config: &Config) -> ApplicationSection {
    ApplicationSection {
        name: config.app_name.clone(),
        version: config.app_version.clone(),
        description: config.app_description.clone(),
        port: config.port,
    }
}

fn environment_section(config: &Config, runtime: &RuntimeSnapshot) -> EnvironmentSection {
    EnvironmentSection {
        active_profiles: config.active_profiles(),
        os_name: runtime.os_name.clone(),
        os_version: runtime.os_version.clone(),
        kernel_version: runtime.kernel_version.clone(),
        arch: runtime.arch.clone(),
        hostname: runtime.hostname.clone(),
    }
}

fn up_or_down(ok: bool) -> String {
    let status = if ok { "UP" } else { "DOWN" };
    status.to_string()
}

/// Application health with component checks.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "health",
    responses((status = 200, description = "Application health", body = ApiResponse<HealthReport>))
)]
pub async fn health(State(state): State<AppState>, uri: OriginalUri) -> Json<ApiResponse<HealthReport>> {
    let runtime = RuntimeSnapshot::capture_async().await;
    let consul_up = state.discovery.registry_reachable().await;
    let breaker = state.discovery.circuit_state().await;

    let mut checks = Checks::new();
    checks.insert("application".into(), "UP".into());
    checks.insert("consul".into(), up_or_down(consul_up));
    checks.insert("circuitBreaker".into(), breaker.to_string());
    checks.insert("diskSpace".into(), runtime.disk_status().into());
    checks.insert("memory".into(), runtime.memory_status().into());

    debug!(service = %state.config.app_name, consul_up, "Health check requested");

    let report = HealthReport {
        status: "UP".into(),
        service: state.config.app_name.clone(),
        port: state.config.port,
        version: state.config.app_version.clone(),
        timestamp: Utc::now(),
        uptime_minutes: state.started_at.uptime_minutes(),
        checks,
    };

    Json(ApiResponse::success(report, "Application is healthy").with_path(uri.0.path()))
}

/// Application, environment, runtime and registry details.
#[utoipa::path(
    get,
    path = "/api/v1/info",
    tag = "health",
    responses((status = 200, description = "Application info", body = ApiResponse<AppInfo>))
)]
pub async fn app_info(State(state): State<AppState>, uri: OriginalUri) -> Json<ApiResponse<AppInfo>> {
    let config = &state.config;
    let runtime = RuntimeSnapshot::capture_async().await;

    let info = AppInfo {
        application: application_section(config),
        environment: environment_section(config, &runtime),
        runtime: RuntimeSection {
            start_time: state.started_at.wall_clock(),
            uptime_minutes: state.started_at.uptime_minutes(),
            available_processors: runtime.available_processors,
            total_memory_mb: runtime.total_memory_mb,
            used_memory_mb: runtime.used_memory_mb,
            free_memory_mb: runtime.free_memory_mb,
        },
        consul: ConsulSection {
            host: config.consul_host.clone(),
            port: config.consul_port,
            discovery_enabled: config.consul_discovery_enabled,
            config_enabled: config.consul_config_enabled,
            registry: state.discovery.registry_description(),
        },
    };

    Json(
        ApiResponse::success(info, "Application information retrieved successfully")
            .with_path(uri.0.path()),
    )
}

/// Memory, uptime and host figures.
#[utoipa::path(
    get,
    path = "/api/v1/metrics/custom",
    tag = "metrics",
    responses((status = 200, description = "Custom metrics", body = CustomMetrics))
)]
pub async fn custom_metrics(State(state): State<AppState>) -> Json<CustomMetrics> {
    let runtime = RuntimeSnapshot::capture_async().await;

    Json(CustomMetrics {
        memory: MemoryFigures {
            total_mb: runtime.total_memory_mb,
            used_mb: runtime.used_memory_mb,
            free_mb: runtime.free_memory_mb,
            usage_percent: runtime.memory_usage_percent,
        },
        uptime: UptimeFigures {
            start_time: state.started_at.wall_clock(),
            current_time: Utc::now(),
            uptime_minutes: state.started_at.uptime_minutes(),
        },
        system: SystemFigures {
            available_processors: runtime.available_processors,
            hostname: runtime.hostname,
            os_name: runtime.os_name,
            disk_total_mb: runtime.disk_total_mb,
            disk_available_mb: runtime.disk_available_mb,
        },
    })
}

/// Coarse service status.
#[utoipa::path(
    get,
    path = "/api/v1/metrics/status",
    tag = "metrics",
    responses((status = 200, description = "Service status", body = StatusReport))
)]
pub async fn metrics_status(State(state): State<AppState>) -> Json<StatusReport> {
    let runtime = RuntimeSnapshot::capture_async().await;
    let consul_up = state.discovery.registry_reachable().await;

    let mut checks = Checks::new();
    checks.insert(
        "memory".into(),
        if runtime.memory_status() == "UP" { "OK" } else { "WARNING" }.into(),
    );
    checks.insert(
        "consul".into(),
        if consul_up { "CONNECTED" } else { "DISCONNECTED" }.into(),
    );
    checks.insert("config".into(), "LOADED".into());
    checks.insert(
        "circuitBreaker".into(),
        state.discovery.circuit_state().await.to_string(),
    );

    Json(StatusReport {
        status: if consul_up { "HEALTHY" } else { "DEGRADED" }.into(),
        timestamp: Utc::now(),
        service: state.config.app_name.clone(),
        checks,
    })
}

/// Prometheus text exposition.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "metrics",
    responses(
        (status = 200, description = "Prometheus metrics", body = String, content_type = "text/plain"),
        (status = 404, description = "Exporter disabled", body = ErrorResponse)
    )
)]
pub async fn prometheus_metrics(State(state): State<AppState>, uri: OriginalUri) -> ApiResult<Response> {
    let handle = state.prometheus.as_ref().ok_or_else(|| {
        debug!("Metrics exporter disabled");
        ApiError::new(
            DiscoveryError::RouteNotFound(uri.0.path().to_string()),
            uri.0.path(),
        )
    })?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
        .into_response())
}

/// All configuration properties grouped by their first key segment.
#[utoipa::path(
    get,
    path = "/api/v1/config/properties",
    tag = "config",
    responses((status = 200, description = "Grouped properties", body = ApiResponse<BTreeMap<String, BTreeMap<String, String>>>))
)]
pub async fn config_properties(
    State(state): State<AppState>,
    uri: OriginalUri,
) -> Json<ApiResponse<BTreeMap<String, BTreeMap<String, String>>>> {
    let mut grouped: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    for (key, value) in state.config.properties() {
        let (group, rest) = key.split_once('.').unwrap_or((key.as_str(), ""));
        grouped
            .entry(group.to_string())
            .or_default()
            .insert(rest.to_string(), value);
    }

    info!(groups = grouped.len(), "Configuration properties retrieved");
    Json(
        ApiResponse::success(grouped, "Configuration properties retrieved successfully")
            .with_path(uri.0.path()),
    )
}

/// One property by dotted key, e.g. `consul.host`.
#[utoipa::path(
    get,
    path = "/api/v1/config/properties/{key}",
    tag = "config",
    params(("key" = String, Path, description = "Dotted property key", example = "server.port")),
    responses(
        (status = 200, description = "Property value", body = ApiResponse<PropertyValue>),
        (status = 400, description = "Blank key", body = ErrorResponse),
        (status = 404, description = "Unknown key", body = ErrorResponse)
    )
)]
pub async fn config_property(
    State(state): State<AppState>,
    Path(key): Path<String>,
    uri: OriginalUri,
) -> ApiResult<Json<ApiResponse<PropertyValue>>> {
    let key = key.trim();
    if key.is_empty() {
        return Err(ApiError::new(
            DiscoveryError::InvalidArgument("Property key cannot be null or empty".into()),
            uri.0.path(),
        ));
    }

    let value = state.config.property(key).ok_or_else(|| {
        warn!(key, "Property not found");
        ApiError::new(DiscoveryError::PropertyNotFound(key.to_string()), uri.0.path())
    })?;

    debug!(key, value = %value, "Property retrieved");
    let message = format!("Property '{}' retrieved successfully", key);
    let body = PropertyValue {
        key: key.to_string(),
        value,
        timestamp: Utc::now(),
    };
    Ok(Json(ApiResponse::success(body, message).with_path(uri.0.path())))
}

/// Application info including contact details.
#[utoipa::path(
    get,
    path = "/api/v1/config/info",
    tag = "config",
    responses((status = 200, description = "Application info", body = ApiResponse<ConfigInfo>))
)]
pub async fn config_info(State(state): State<AppState>, uri: OriginalUri) -> Json<ApiResponse<ConfigInfo>> {
    let config = &state.config;
    let runtime = RuntimeSnapshot::capture_async().await;
    let connected = state.discovery.registry_reachable().await;

    let info = ConfigInfo {
        application: application_section(config),
        environment: environment_section(config, &runtime),
        consul: ConnectionSection {
            host: config.consul_host.clone(),
            port: config.consul_port,
            connection_status: if connected { "CONNECTED" } else { "DISCONNECTED" }.into(),
        },
        contact: ContactSection {
            name: config.app_contact_name.clone(),
            email: config.app_contact_email.clone(),
        },
        timestamp: Utc::now(),
    };

    Json(
        ApiResponse::success(info, "Application information retrieved successfully")
            .with_path(uri.0.path()),
    )
}

/// Re-read the environment and report which keys changed.
///
/// The running configuration is not replaced.
#[utoipa::path(
    post,
    path = "/api/v1/config/refresh",
    tag = "config",
    responses(
        (status = 200, description = "Refresh report", body = ApiResponse<RefreshReport>),
        (status = 500, description = "Environment could not be read", body = ErrorResponse)
    )
)]
pub async fn config_refresh(
    State(state): State<AppState>,
    uri: OriginalUri,
) -> ApiResult<Json<ApiResponse<RefreshReport>>> {
    let fresh = Config::load().map_err(|e| {
        ApiError::new(
            DiscoveryError::Internal(format!("Failed to refresh configuration: {}", e)),
            uri.0.path(),
        )
    })?;

    let changed_keys = state.config.changed_keys(&fresh);
    info!(changed = ?changed_keys, "Configuration refresh triggered");

    let now = Utc::now();
    let report = RefreshReport {
        status: "SUCCESS".into(),
        changed_keys,
        applied: false,
        timestamp: now,
        next_check: now + Duration::minutes(1),
    };

    Ok(Json(
        ApiResponse::success(report, "Configuration refresh triggered successfully")
            .with_path(uri.0.path()),
    ))
}

/// Active and default profiles.
#[utoipa::path(
    get,
    path = "/api/v1/config/profiles",
    tag = "config",
    responses((status = 200, description = "Profiles", body = ApiResponse<ProfilesInfo>))
)]
pub async fn config_profiles(State(state): State<AppState>, uri: OriginalUri) -> Json<ApiResponse<ProfilesInfo>> {
    let profiles = ProfilesInfo {
        active: state.config.active_profiles(),
        default: vec!["default".to_string()],
        count: state.config.app_profiles.iter().filter(|p| !p.trim().is_empty()).count(),
        timestamp: Utc::now(),
    };

    Json(
        ApiResponse::success(profiles, "Environment profiles retrieved successfully")
            .with_path(uri.0.path()),
    )
}
