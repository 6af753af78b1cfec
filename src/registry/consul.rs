//! Consul HTTP API registry client.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use super::types::{RegistryInstance, SECURE_METADATA_KEY};
use super::RegistryClient;
use crate::config::Config;
use crate::error::{AppError, RegistryError};
use crate::metrics;

/// Header carrying the Consul ACL token.
const TOKEN_HEADER: &str = "X-Consul-Token";

/// Registry client backed by a Consul agent.
#[derive(Debug, Clone)]
pub struct ConsulRegistryClient {
    /// HTTP client for API requests.
    http: reqwest::Client,
    /// Agent base URL, e.g. `http://localhost:8500/`.
    base_url: Url,
    /// Optional ACL token.
    token: Option<String>,
    /// Optional datacenter.
    datacenter: Option<String>,
    /// Restrict instance lookups to passing checks.
    passing_only: bool,
}

/// Entry returned by `/v1/health/service/{name}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HealthEntry {
    /// Node the service runs on.
    pub node: NodeEntry,
    /// Service registration.
    pub service: ServiceEntry,
}

/// Node part of a health entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeEntry {
    /// Node name.
    #[serde(default)]
    pub node: String,
    /// Node address.
    #[serde(default)]
    pub address: String,
}

/// Service part of a health entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceEntry {
    /// Instance ID.
    #[serde(rename = "ID")]
    pub id: String,
    /// Service name.
    pub service: String,
    /// Service address (empty means "use the node address").
    #[serde(default)]
    pub address: String,
    /// Service port.
    pub port: u16,
    /// Tags (Consul sends null when there are none).
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Metadata.
    #[serde(default)]
    pub meta: Option<HashMap<String, String>>,
}

impl From<HealthEntry> for RegistryInstance {
    fn from(entry: HealthEntry) -> Self {
        let HealthEntry { node, service } = entry;
        let metadata = service.meta.unwrap_or_default();
        let secure = metadata
            .get(SECURE_METADATA_KEY)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let host = if service.address.is_empty() {
            node.address
        } else {
            service.address
        };

        RegistryInstance {
            service_id: service.service,
            instance_id: service.id,
            host,
            port: service.port,
            secure,
            tags: service.tags.unwrap_or_default(),
            metadata,
        }
    }
}

impl ConsulRegistryClient {
    /// Create a new Consul client from config.
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms))
            .connect_timeout(Duration::from_millis(config.http_timeout_ms.min(2000)))
            .tcp_nodelay(true)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(RegistryError::from)?;

        Ok(Self {
            http,
            base_url: config.consul_base_url()?,
            token: config.consul_token.clone(),
            datacenter: config.consul_datacenter.clone(),
            passing_only: config.consul_passing_only,
        })
    }

    /// Agent base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build an API URL from path segments. Segments are percent-encoded.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, RegistryError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RegistryError::Parse(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Start a GET request with token and datacenter applied.
    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        let mut request = self.http.get(url);
        if let Some(token) = &self.token {
            request = request.header(TOKEN_HEADER, token);
        }
        if let Some(dc) = &self.datacenter {
            request = request.query(&[("dc", dc)]);
        }
        request
    }

    /// Send a request and fail on non-success status codes.
    async fn send(&self, request: reqwest::RequestBuilder, path: &str) -> Result<reqwest::Response, RegistryError> {
        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(RegistryError::Status {
                status: response.status().as_u16(),
                path: path.to_string(),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl RegistryClient for ConsulRegistryClient {
    #[instrument(skip(self))]
    async fn list_services(&self) -> Result<Vec<String>, RegistryError> {
        let _timer = metrics::timer_registry_call("list_services");
        let url = self.endpoint(&["v1", "catalog", "services"])?;
        let path = url.path().to_string();

        let response = self.send(self.get(url), &path).await?;
        let catalog: HashMap<String, Vec<String>> = response
            .json()
            .await
            .map_err(|e| RegistryError::Parse(format!("catalog services: {}", e)))?;

        let mut names: Vec<String> = catalog.into_keys().collect();
        names.sort();

        debug!(count = names.len(), "Listed catalog services");
        Ok(names)
    }

    #[instrument(skip(self), fields(service = %service_name))]
    async fn list_instances(
        &self,
        service_name: &str,
    ) -> Result<Vec<RegistryInstance>, RegistryError> {
        let _timer = metrics::timer_registry_call("list_instances");
        let url = self.endpoint(&["v1", "health", "service", service_name])?;
        let path = url.path().to_string();

        let mut request = self.get(url);
        if self.passing_only {
            request = request.query(&[("passing", "true")]);
        }

        let response = self.send(request, &path).await?;
        let entries: Vec<HealthEntry> = response
            .json()
            .await
            .map_err(|e| RegistryError::Parse(format!("health service entries: {}", e)))?;

        let instances: Vec<RegistryInstance> = entries.into_iter().map(Into::into).collect();

        debug!(count = instances.len(), "Listed service instances");
        Ok(instances)
    }

    #[instrument(skip(self))]
    async fn ping(&self) -> Result<(), RegistryError> {
        let url = self.endpoint(&["v1", "status", "leader"])?;
        let path = url.path().to_string();
        self.send(self.get(url), &path).await.map(|_| ())
    }

    fn describe(&self) -> String {
        format!("consul at {}", self.base_url)
    }
}
