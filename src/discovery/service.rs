//! Discovery facade over a registry client.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::registration::{self, RegistrationAck, RegistrationRequest};
use super::stats::StatsBuilder;
use super::types::{ServiceInstanceDto, ServiceStats};
use crate::config::Config;
use crate::error::{DiscoveryError, RegistryError, Result};
use crate::metrics;
use crate::registry::RegistryClient;
use crate::resilience::{CircuitState, ResiliencePolicy};

/// Answers discovery questions for the HTTP layer.
///
/// Cheap to clone; clones share the registry client and resilience policy.
#[derive(Clone)]
pub struct DiscoveryService {
    registry: Arc<dyn RegistryClient>,
    policy: Arc<ResiliencePolicy>,
    fallback_services: Arc<Vec<String>>,
    unknown_is_healthy: bool,
}

impl fmt::Debug for DiscoveryService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryService")
            .field("registry", &self.registry.describe())
            .field("policy", &self.policy.name())
            .field("fallback_services", &self.fallback_services)
            .field("unknown_is_healthy", &self.unknown_is_healthy)
            .finish()
    }
}

impl DiscoveryService {
    /// Create a facade with explicit settings.
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        policy: ResiliencePolicy,
        fallback_services: Vec<String>,
        unknown_is_healthy: bool,
    ) -> Self {
        Self {
            registry,
            policy: Arc::new(policy),
            fallback_services: Arc::new(fallback_services),
            unknown_is_healthy,
        }
    }

    /// Create a facade configured from `config`.
    pub fn from_config(registry: Arc<dyn RegistryClient>, config: &Config) -> Self {
        Self::new(
            registry,
            ResiliencePolicy::new(config.resilience()),
            config.fallback_services.clone(),
            config.discovery_unknown_status_healthy,
        )
    }

    /// Registry description for logs and info output.
    pub fn registry_description(&self) -> String {
        self.registry.describe()
    }

    /// Current state of the resilience policy's breaker.
    pub async fn circuit_state(&self) -> CircuitState {
        self.policy.circuit_state().await
    }

    /// Whether the registry answers a reachability probe.
    pub async fn registry_reachable(&self) -> bool {
        match self.registry.ping().await {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Registry probe failed");
                false
            }
        }
    }

    /// List registered service names, without the resilience policy.
    #[instrument(skip(self))]
    pub async fn list_services(&self) -> Result<Vec<String>> {
        let services = self.registry.list_services().await.map_err(|e| {
            error!(error = %e, "Error retrieving services from registry");
            metrics::inc_registry_failures("list_services");
            DiscoveryError::connection("Failed to retrieve services from Consul", e)
        })?;

        info!(count = services.len(), services = ?services, "Found services in registry");
        Ok(services)
    }

    /// List service names on a background task under the resilience policy.
    ///
    /// When the policy gives up or the breaker is open, the configured
    /// fallback list is returned instead.
    pub fn list_services_async(&self) -> JoinHandle<Result<Vec<String>>> {
        let this = self.clone();
        tokio::spawn(async move { this.list_services_resilient().await })
    }

    #[instrument(skip(self))]
    async fn list_services_resilient(&self) -> Result<Vec<String>> {
        match self.policy.execute(move || self.list_services()).await {
            Ok(services) => Ok(services),
            Err(e) if e.is_retryable() || matches!(e, DiscoveryError::CircuitOpen { .. }) => {
                warn!(error = %e, fallback = ?self.fallback_services, "Using fallback service list");
                metrics::inc_fallbacks();
                Ok(self.fallback_services.as_ref().clone())
            }
            Err(e) => Err(e),
        }
    }

    /// Instances of `service_name` under the resilience policy.
    ///
    /// A blank name fails before any registry call; zero instances is "not found".
    #[instrument(skip(self))]
    pub async fn get_service_instances(&self, service_name: &str) -> Result<Vec<ServiceInstanceDto>> {
        if service_name.trim().is_empty() {
            return Err(DiscoveryError::InvalidArgument(
                "Service name cannot be null or empty".to_string(),
            ));
        }

        self.policy
            .execute(move || self.fetch_instances(service_name))
            .await
    }

    async fn fetch_instances(&self, service_name: &str) -> Result<Vec<ServiceInstanceDto>> {
        let instances = self
            .registry
            .list_instances(service_name)
            .await
            .map_err(|e| {
                error!(service = %service_name, error = %e, "Error retrieving instances");
                metrics::inc_registry_failures("list_instances");
                DiscoveryError::connection("Failed to retrieve service instances", e)
            })?;

        if instances.is_empty() {
            warn!(service = %service_name, "No instances found for service");
            return Err(DiscoveryError::ServiceNotFound(service_name.to_string()));
        }

        let dtos: Vec<ServiceInstanceDto> = instances.into_iter().map(Into::into).collect();
        info!(
            service = %service_name,
            count = dtos.len(),
            instances = ?dtos.iter().map(|d| d.instance_id.as_str()).collect::<Vec<_>>(),
            "Found instances for service"
        );
        Ok(dtos)
    }

    /// Whether any instance of `service_name` is healthy. Every failure reads as `false`.
    #[instrument(skip(self))]
    pub async fn is_service_healthy(&self, service_name: &str) -> bool {
        match self.get_service_instances(service_name).await {
            Ok(instances) => instances
                .iter()
                .any(|i| i.instance_status().is_healthy(self.unknown_is_healthy)),
            Err(DiscoveryError::ServiceNotFound(_)) => false,
            Err(e) => {
                error!(service = %service_name, error = %e, "Error checking service health");
                false
            }
        }
    }

    /// Aggregate statistics across every registered service.
    ///
    /// Services are looked up one at a time without the resilience policy.
    #[instrument(skip(self))]
    pub async fn service_stats(&self) -> Result<ServiceStats> {
        let start = Instant::now();
        let failed = |e: RegistryError| {
            error!(error = %e, "Error calculating service stats");
            DiscoveryError::connection("Failed to calculate service statistics", e)
        };

        let services = self.registry.list_services().await.map_err(failed)?;
        let mut builder = StatsBuilder::new(self.unknown_is_healthy);

        for name in &services {
            let instances = self.registry.list_instances(name).await.map_err(failed)?;
            if instances.is_empty() {
                debug!(service = %name, "Service unavailable");
                builder.record_unavailable();
                continue;
            }

            let dtos: Vec<ServiceInstanceDto> = instances.into_iter().map(Into::into).collect();
            let health = builder.record_instances(name, &dtos);
            debug!(service = %name, instances = dtos.len(), health = %health, "Service classified");
        }

        metrics::record_stats_latency(start);
        Ok(builder.build())
    }

    /// Validate a registration request. Nothing is written to the registry.
    #[instrument(skip(self, request), fields(service = ?request.service_name))]
    pub fn register(&self, request: &RegistrationRequest) -> Result<RegistrationAck> {
        match registration::accept(request) {
            Ok(ack) => {
                info!(
                    service = %ack.service_name,
                    host = ?request.host,
                    port = ?request.port,
                    instance_id = %ack.instance_id,
                    "Service registration validated"
                );
                metrics::inc_registrations_validated();
                Ok(ack)
            }
            Err(e) => {
                error!(error = %e, "Error registering service");
                Err(e)
            }
        }
    }
}
