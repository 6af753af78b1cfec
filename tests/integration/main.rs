//! End-to-end tests for the HTTP API against a mock registry.
//!
//! Run with: cargo test --test integration

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

use consul_discovery::api::{create_router, AppState};
use consul_discovery::config::Config;
use consul_discovery::discovery::DiscoveryService;
use consul_discovery::registry::{MockConfig, MockRegistryClient, RegistryInstance};
use consul_discovery::runtime::StartedAt;

/// Config with a short retry schedule so failure paths finish quickly.
fn test_config() -> Config {
    Config {
        resilience_max_attempts: 2,
        resilience_wait_ms: 5,
        resilience_max_wait_ms: 10,
        resilience_timeout_ms: 500,
        fallback_services: vec!["consul".into(), "gateway".into()],
        ..Config::default()
    }
}

fn app_with(mock: &MockRegistryClient, config: Config) -> Router {
    let discovery = DiscoveryService::from_config(Arc::new(mock.clone()), &config);
    create_router(AppState::new(config, discovery, StartedAt::now()))
}

fn app(mock: &MockRegistryClient) -> Router {
    app_with(mock, test_config())
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

async fn post_json(app: Router, uri: &str, body: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

fn registration(name: &str, host: &str, port: i64) -> String {
    json!({ "serviceName": name, "host": host, "port": port }).to_string()
}

#[tokio::test]
async fn lists_services_in_envelope() {
    let mock = MockRegistryClient::new();
    mock.add_service("consul");
    mock.add_instance(RegistryInstance::new("orders", "orders-1", "10.0.0.1", 8080));

    let (status, json) = get(app(&mock), "/api/v1/consul/services").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"], json!(["consul", "orders"]));
    assert_eq!(json["message"], "Successfully retrieved 2 services");
    assert_eq!(json["path"], "/api/v1/consul/services");
    assert!(json["timestamp"].is_string());
    assert!(json.get("error").is_none() || json["error"].is_null());
}

#[tokio::test]
async fn registry_outage_maps_to_503() {
    let mock = MockRegistryClient::with_config(MockConfig {
        fail_services: true,
        ..MockConfig::default()
    });

    let (status, json) = get(app(&mock), "/api/v1/consul/services").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "CONSUL_CONNECTION_FAILED");
    assert_eq!(json["path"], "/api/v1/consul/services");
}

#[tokio::test]
async fn async_listing_falls_back_when_registry_is_down() {
    let mock = MockRegistryClient::with_config(MockConfig {
        fail_services: true,
        ..MockConfig::default()
    });

    let (status, json) = get(app(&mock), "/api/v1/consul/services/async").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"], json!(["consul", "gateway"]));
    assert_eq!(mock.service_calls(), 2);
}

#[tokio::test]
async fn async_listing_recovers_from_transient_failure() {
    let mock = MockRegistryClient::with_config(MockConfig {
        transient_failures: 1,
        ..MockConfig::default()
    });
    mock.add_service("billing");

    let (status, json) = get(app(&mock), "/api/v1/consul/services/async").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"], json!(["billing"]));
}

#[tokio::test]
async fn instances_are_mapped_to_dtos() {
    let mock = MockRegistryClient::new();
    mock.add_instance(
        RegistryInstance::new("orders", "orders-1", "10.0.0.1", 8443)
            .secured()
            .with_metadata("zone", "a"),
    );

    let (status, json) = get(app(&mock), "/api/v1/consul/services/orders").await;

    assert_eq!(status, StatusCode::OK);
    let instance = &json["data"][0];
    assert_eq!(instance["serviceId"], "orders");
    assert_eq!(instance["instanceId"], "orders-1");
    assert_eq!(instance["uri"], "https://10.0.0.1:8443");
    assert_eq!(instance["scheme"], "https");
    assert_eq!(instance["secure"], true);
    assert_eq!(instance["status"], "UP");
    assert_eq!(instance["metadata"]["zone"], "a");
}

#[tokio::test]
async fn service_without_instances_is_404_and_unhealthy() {
    let mock = MockRegistryClient::new();
    mock.add_service("ghost");

    let (status, json) = get(app(&mock), "/api/v1/consul/services/ghost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "SERVICE_NOT_FOUND");
    assert_eq!(json["message"], "Service 'ghost' not found in Consul registry");

    let (status, json) = get(app(&mock), "/api/v1/consul/services/ghost/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"], false);
}

#[tokio::test]
async fn blank_service_name_is_rejected_before_registry_call() {
    let mock = MockRegistryClient::new();

    let (status, json) = get(app(&mock), "/api/v1/consul/services/%20%20").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "ILLEGAL_ARGUMENT");
    assert_eq!(mock.instance_calls(), 0);
}

#[tokio::test]
async fn health_reflects_instance_status() {
    let mock = MockRegistryClient::new();
    mock.add_instance(
        RegistryInstance::new("web", "web-1", "10.0.0.2", 80).with_metadata("status", "DOWN"),
    );
    mock.add_instance(RegistryInstance::new("web", "web-2", "10.0.0.3", 80));

    let (_, json) = get(app(&mock), "/api/v1/consul/services/web/health").await;
    assert_eq!(json["data"], true);

    mock.clear();
    mock.add_instance(
        RegistryInstance::new("web", "web-1", "10.0.0.2", 80).with_metadata("status", "DOWN"),
    );
    let (_, json) = get(app(&mock), "/api/v1/consul/services/web/health").await;
    assert_eq!(json["data"], false);
}

#[tokio::test]
async fn stats_aggregate_every_service() {
    let mock = MockRegistryClient::new();
    mock.add_instance(RegistryInstance::new("a", "a-1", "h", 1));
    mock.add_instance(RegistryInstance::new("a", "a-2", "h", 2));
    mock.add_instance(RegistryInstance::new("b", "b-1", "h", 3).with_metadata("status", "DOWN"));
    mock.add_service("c");

    let (status, json) = get(app(&mock), "/api/v1/consul/services/stats").await;

    assert_eq!(status, StatusCode::OK);
    let stats = &json["data"];
    assert_eq!(stats["totalServices"], 3);
    assert_eq!(stats["healthyServices"], 1);
    assert_eq!(stats["unhealthyServices"], 2);
    assert_eq!(stats["totalInstances"], 3);
    assert_eq!(stats["servicesByStatus"]["HEALTHY"], 1);
    assert_eq!(stats["servicesByStatus"]["UNHEALTHY"], 1);
    assert_eq!(stats["servicesByStatus"]["UNAVAILABLE"], 1);
    assert_eq!(stats["instancesByService"], json!({ "a": 2, "b": 1 }));
}

#[tokio::test]
async fn registration_port_bounds() {
    let mock = MockRegistryClient::new();

    for port in [0, 65536] {
        let (status, json) = post_json(
            app(&mock),
            "/api/v1/consul/register",
            &registration("orders", "localhost", port),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "port {}", port);
        assert_eq!(json["error"], "VALIDATION_FAILED");
        assert!(json["data"]["port"].is_string());
    }

    for port in [1, 65535] {
        let (status, json) = post_json(
            app(&mock),
            "/api/v1/consul/register",
            &registration("orders", "localhost", port),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "port {}", port);
        assert_eq!(json["success"], true);
    }
}

#[tokio::test]
async fn registration_defaults_instance_id() {
    let (status, json) = post_json(
        app(&MockRegistryClient::new()),
        "/api/v1/consul/register",
        &registration("orders", "10.0.0.9", 9000),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["data"]["serviceName"], "orders");
    assert_eq!(json["data"]["instanceId"], "orders:10.0.0.9:9000");
    assert_eq!(json["message"], "Service registered successfully");
}

#[tokio::test]
async fn registration_reports_every_invalid_field() {
    let (status, json) = post_json(
        app(&MockRegistryClient::new()),
        "/api/v1/consul/register",
        r#"{"serviceName": "bad name"}"#,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "VALIDATION_FAILED");
    assert!(json["data"]["serviceName"].is_string());
    assert_eq!(json["data"]["host"], "Host is required");
    assert_eq!(json["data"]["port"], "Port is required");
}

#[tokio::test]
async fn malformed_registration_body_is_a_validation_failure() {
    let (status, json) = post_json(
        app(&MockRegistryClient::new()),
        "/api/v1/consul/register",
        "{not json",
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "VALIDATION_FAILED");
    assert!(json["data"]["body"].is_string());
}

#[tokio::test]
async fn health_reports_consul_down_without_failing() {
    let mock = MockRegistryClient::with_config(MockConfig {
        fail_services: true,
        ..MockConfig::default()
    });

    let (status, json) = get(app(&mock), "/api/v1/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["checks"]["consul"], "DOWN");
    assert_eq!(json["data"]["checks"]["application"], "UP");
}

#[tokio::test]
async fn metrics_status_degrades_with_registry() {
    let mock = MockRegistryClient::with_config(MockConfig {
        fail_services: true,
        ..MockConfig::default()
    });

    let (status, json) = get(app(&mock), "/api/v1/metrics/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "DEGRADED");
}

#[tokio::test]
async fn config_property_lookup() {
    let mock = MockRegistryClient::new();

    let (status, json) = get(app(&mock), "/api/v1/config/properties/server.port").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["key"], "server.port");
    assert_eq!(json["data"]["value"], "8081");

    let (status, json) = get(app(&mock), "/api/v1/config/properties/no.such.key").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "PROPERTY_NOT_FOUND");
}

#[tokio::test]
async fn config_properties_never_expose_token() {
    let config = Config {
        consul_token: Some("secret-token".into()),
        ..test_config()
    };

    let (status, json) = get(app_with(&MockRegistryClient::new(), config), "/api/v1/config/properties").await;

    assert_eq!(status, StatusCode::OK);
    assert!(!json.to_string().contains("secret-token"));
    assert_eq!(json["data"]["consul"]["token.set"], "true");
}

#[tokio::test]
async fn padded_service_name_is_rejected() {
    let (status, json) = post_json(
        app(&MockRegistryClient::new()),
        "/api/v1/consul/register",
        &registration(" billing ", "h", 80),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "VALIDATION_FAILED");
    assert!(json["data"]["serviceName"].is_string());
}

#[tokio::test]
async fn null_optional_fields_are_accepted() {
    let body = r#"{"serviceName":"billing","host":"h","port":80,"tags":null,"secure":null,
        "metadata":null,"healthCheckPath":null,"healthCheckInterval":null,"scheme":null,
        "instanceId":null}"#;

    let (status, json) = post_json(
        app(&MockRegistryClient::new()),
        "/api/v1/consul/register",
        body,
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["data"]["instanceId"], "billing:h:80");
}

#[tokio::test]
async fn slow_registry_times_out_as_503() {
    let mock = MockRegistryClient::with_config(MockConfig {
        latency_ms: 300,
        ..MockConfig::default()
    });
    mock.add_instance(RegistryInstance::new("orders", "orders-1", "10.0.0.1", 8080));
    let config = Config {
        resilience_max_attempts: 1,
        resilience_timeout_ms: 50,
        ..test_config()
    };

    let (status, json) = get(app_with(&mock, config), "/api/v1/consul/services/orders").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"], "CONSUL_TIMEOUT");
    assert_eq!(json["path"], "/api/v1/consul/services/orders");
}
