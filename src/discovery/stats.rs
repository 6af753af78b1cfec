//! Service statistics aggregation.

use std::collections::BTreeMap;

use chrono::Utc;

use super::types::{ServiceHealth, ServiceInstanceDto, ServiceStats};

/// Accumulates per-service outcomes into [`ServiceStats`].
#[derive(Debug, Clone, Default)]
pub struct StatsBuilder {
    unknown_is_healthy: bool,
    total_services: usize,
    healthy_services: usize,
    total_instances: usize,
    services_by_status: BTreeMap<String, usize>,
    instances_by_service: BTreeMap<String, usize>,
}

impl StatsBuilder {
    /// Create a builder. `unknown_is_healthy` decides how instances without a status count.
    pub fn new(unknown_is_healthy: bool) -> Self {
        Self {
            unknown_is_healthy,
            ..Self::default()
        }
    }

    fn tally(&mut self, health: ServiceHealth) {
        *self
            .services_by_status
            .entry(health.to_string())
            .or_insert(0) += 1;
    }

    /// Record a service whose lookup returned instances.
    pub fn record_instances(&mut self, service: &str, instances: &[ServiceInstanceDto]) -> ServiceHealth {
        self.total_services += 1;
        self.total_instances += instances.len();
        self.instances_by_service
            .insert(service.to_string(), instances.len());

        let healthy = instances
            .iter()
            .any(|i| i.instance_status().is_healthy(self.unknown_is_healthy));

        let health = if healthy {
            self.healthy_services += 1;
            ServiceHealth::Healthy
        } else {
            ServiceHealth::Unhealthy
        };
        self.tally(health);
        health
    }

    /// Record a listed service with no instances.
    pub fn record_unavailable(&mut self) {
        self.total_services += 1;
        self.tally(ServiceHealth::Unavailable);
    }

    /// Finish aggregation.
    pub fn build(self) -> ServiceStats {
        ServiceStats {
            total_services: self.total_services,
            healthy_services: self.healthy_services,
            unhealthy_services: self.total_services - self.healthy_services,
            total_instances: self.total_instances,
            services_by_status: self.services_by_status,
            instances_by_service: self.instances_by_service,
            last_updated: Utc::now(),
        }
    }
}
