//! HTTP API route definitions.

use std::time::Duration;

use axum::http::{HeaderValue, Method};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use super::handlers::{
    get_service_instances, list_services, list_services_async, not_found, register_service,
    service_health, service_stats, AppState,
};
use super::openapi::create_openapi_router;
use super::system::{
    app_info, config_info, config_profiles, config_property, config_properties, config_refresh,
    custom_metrics, health, metrics_status, prometheus_metrics,
};
use crate::config::Config;

/// CORS layer from configured origins. `*` allows any origin.
pub fn cors_layer(config: &Config) -> CorsLayer {
    let origin = if config.cors_allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_allowed_origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .max_age(Duration::from_secs(config.cors_max_age_s))
}

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    let config = state.config.clone();

    Router::new()
        // Discovery endpoints
        .route("/api/v1/consul/services", get(list_services))
        .route("/api/v1/consul/services/async", get(list_services_async))
        .route("/api/v1/consul/services/stats", get(service_stats))
        .route("/api/v1/consul/services/:name", get(get_service_instances))
        .route("/api/v1/consul/services/:name/health", get(service_health))
        .route("/api/v1/consul/register", post(register_service))
        // Health and info
        .route("/api/v1/health", get(health))
        .route("/api/v1/info", get(app_info))
        // Metrics
        .route("/api/v1/metrics/custom", get(custom_metrics))
        .route("/api/v1/metrics/status", get(metrics_status))
        .route("/metrics", get(prometheus_metrics))
        // Configuration
        .route("/api/v1/config/properties", get(config_properties))
        .route("/api/v1/config/properties/:key", get(config_property))
        .route("/api/v1/config/info", get(config_info))
        .route("/api/v1/config/refresh", post(config_refresh))
        .route("/api/v1/config/profiles", get(config_profiles))
        .fallback(not_found)
        .with_state(state)
        .merge(create_openapi_router(&config))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::DiscoveryService;
    use crate::registry::{MockRegistryClient, RegistryInstance};
    use crate::runtime::StartedAt;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(mock: &MockRegistryClient) -> Router {
        let config = Config::default();
        let discovery = DiscoveryService::from_config(Arc::new(mock.clone()), &config);
        create_router(AppState::new(config, discovery, StartedAt::now()))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let (status, json) = get_json(app(&MockRegistryClient::new()), "/api/v1/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["status"], "UP");
        assert_eq!(json["data"]["checks"]["consul"], "UP");
        assert_eq!(json["data"]["checks"]["circuitBreaker"], "CLOSED");
    }

    #[tokio::test]
    async fn static_segments_win_over_service_name() {
        let mock = MockRegistryClient::new();
        mock.add_instance(RegistryInstance::new("stats", "stats-1", "localhost", 80));

        let (status, json) = get_json(app(&mock), "/api/v1/consul/services/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["totalServices"], 1);
    }

    #[tokio::test]
    async fn unknown_path_returns_envelope() {
        let (status, json) = get_json(app(&MockRegistryClient::new()), "/nope").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "NOT_FOUND");
        assert_eq!(json["path"], "/nope");
    }

    #[tokio::test]
    async fn metrics_endpoint_is_404_without_exporter() {
        let (status, json) = get_json(app(&MockRegistryClient::new()), "/metrics").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "NOT_FOUND");
        assert_eq!(json["path"], "/metrics");
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let (status, json) = get_json(app(&MockRegistryClient::new()), "/api-docs/openapi.json").await;

        assert_eq!(status, StatusCode::OK);
        assert!(json["paths"]["/api/v1/consul/services"].is_object());
    }

    #[test]
    fn cors_accepts_explicit_origins() {
        let config = Config {
            cors_allowed_origins: vec!["https://example.com".into(), "not a header\n".into()],
            ..Config::default()
        };
        let _layer = cors_layer(&config);
    }
}
