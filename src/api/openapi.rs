//! OpenAPI documentation.

use axum::Router;
use utoipa::openapi::ContactBuilder;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::envelope::{ApiResponse, ErrorResponse};
use super::system::{
    AppInfo, ConfigInfo, CustomMetrics, HealthReport, ProfilesInfo, PropertyValue, RefreshReport,
    StatusReport,
};
use crate::config::Config;
use crate::discovery::{RegistrationAck, RegistrationRequest, ServiceInstanceDto, ServiceStats};
use crate::resilience::CircuitState;

/// OpenAPI specification for the discovery API.
#[derive(OpenApi)]
#[openapi(
    paths(
        super::handlers::list_services,
        super::handlers::list_services_async,
        super::handlers::service_stats,
        super::handlers::get_service_instances,
        super::handlers::service_health,
        super::handlers::register_service,
        super::system::health,
        super::system::app_info,
        super::system::custom_metrics,
        super::system::metrics_status,
        super::system::prometheus_metrics,
        super::system::config_properties,
        super::system::config_property,
        super::system::config_info,
        super::system::config_refresh,
        super::system::config_profiles,
    ),
    components(
        schemas(
            ApiResponse<Vec<String>>,
            ApiResponse<Vec<ServiceInstanceDto>>,
            ApiResponse<ServiceStats>,
            ApiResponse<RegistrationAck>,
            ApiResponse<HealthReport>,
            ApiResponse<AppInfo>,
            ErrorResponse,
            ServiceInstanceDto,
            ServiceStats,
            RegistrationRequest,
            RegistrationAck,
            HealthReport,
            AppInfo,
            CustomMetrics,
            StatusReport,
            PropertyValue,
            ConfigInfo,
            RefreshReport,
            ProfilesInfo,
            CircuitState,
        )
    ),
    tags(
        (name = "services", description = "Service discovery operations"),
        (name = "health", description = "Application health and information"),
        (name = "metrics", description = "Runtime metrics"),
        (name = "config", description = "Configuration management"),
    )
)]
pub struct ApiDoc;

/// OpenAPI document with application metadata taken from `config`.
pub fn api_doc(config: &Config) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info.title = config.app_name.clone();
    doc.info.version = config.app_version.clone();
    doc.info.description = Some(config.app_description.clone());
    doc.info.contact = Some(
        ContactBuilder::new()
            .name(Some(config.app_contact_name.clone()))
            .email(Some(config.app_contact_email.clone()))
            .build(),
    );
    doc
}

/// Swagger UI at `/swagger-ui`, document at `/api-docs/openapi.json`.
pub fn create_openapi_router(config: &Config) -> Router {
    Router::new().merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api_doc(config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_endpoint() {
        let doc = api_doc(&Config::default());
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();

        for expected in [
            "/api/v1/consul/services",
            "/api/v1/consul/services/{name}",
            "/api/v1/consul/register",
            "/api/v1/health",
            "/api/v1/config/properties/{key}",
            "/metrics",
        ] {
            assert!(paths.contains(&expected), "missing {}", expected);
        }
        assert_eq!(doc.info.title, "consul-discovery");
    }
}
