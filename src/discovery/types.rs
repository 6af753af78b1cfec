//! Discovery response types.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

use crate::registry::RegistryInstance;

/// Status assumed when an instance reports none.
pub const DEFAULT_STATUS: &str = "UP";

/// Health classification of a single instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    /// Instance reported `UP`.
    Up,
    /// Instance reported something other than `UP`.
    NotUp,
    /// Instance reported no status.
    Unknown,
}

impl InstanceStatus {
    /// Classify a reported status value.
    pub fn classify(reported: Option<&str>) -> Self {
        match reported {
            None => Self::Unknown,
            Some(s) if s.eq_ignore_ascii_case(DEFAULT_STATUS) => Self::Up,
            Some(_) => Self::NotUp,
        }
    }

    /// Whether this status counts as healthy.
    pub fn is_healthy(self, unknown_is_healthy: bool) -> bool {
        match self {
            Self::Up => true,
            Self::NotUp => false,
            Self::Unknown => unknown_is_healthy,
        }
    }
}

/// Instance of a service as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstanceDto {
    /// Service name.
    pub service_id: String,
    /// Instance identifier.
    pub instance_id: String,
    /// Host or IP address.
    pub host: String,
    /// Port.
    pub port: u16,
    /// `scheme://host:port`.
    pub uri: String,
    /// Whether the instance serves over TLS.
    pub secure: bool,
    /// Free-form metadata.
    pub metadata: HashMap<String, String>,
    /// Reported status, `UP` when the instance reports none.
    pub status: String,
    /// `http` or `https`.
    pub scheme: String,
    #[serde(skip)]
    status_reported: bool,
}

impl ServiceInstanceDto {
    /// Health classification of this instance.
    pub fn instance_status(&self) -> InstanceStatus {
        if self.status_reported {
            InstanceStatus::classify(Some(&self.status))
        } else {
            InstanceStatus::Unknown
        }
    }
}

impl From<RegistryInstance> for ServiceInstanceDto {
    fn from(instance: RegistryInstance) -> Self {
        let reported = instance.reported_status().map(str::to_string);
        let uri = instance.uri();
        let scheme = instance.scheme().to_string();

        Self {
            service_id: instance.service_id,
            instance_id: instance.instance_id,
            host: instance.host,
            port: instance.port,
            uri,
            secure: instance.secure,
            metadata: instance.metadata,
            status_reported: reported.is_some(),
            status: reported.unwrap_or_else(|| DEFAULT_STATUS.to_string()),
            scheme,
        }
    }
}

/// Per-service classification label used in statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceHealth {
    /// At least one healthy instance.
    Healthy,
    /// Instances exist, none healthy.
    Unhealthy,
    /// Listed, but zero instances.
    Unavailable,
}

/// Aggregate statistics over all registered services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStats {
    pub total_services: usize,
    pub healthy_services: usize,
    pub unhealthy_services: usize,
    pub total_instances: usize,
    /// `HEALTHY` / `UNHEALTHY` / `UNAVAILABLE` to count.
    pub services_by_status: BTreeMap<String, usize>,
    /// Service name to instance count. Unavailable services are absent.
    pub instances_by_service: BTreeMap<String, usize>,
    pub last_updated: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn classify_reported_status() {
        assert_eq!(InstanceStatus::classify(None), InstanceStatus::Unknown);
        assert_eq!(InstanceStatus::classify(Some("UP")), InstanceStatus::Up);
        assert_eq!(InstanceStatus::classify(Some("up")), InstanceStatus::Up);
        assert_eq!(InstanceStatus::classify(Some("DOWN")), InstanceStatus::NotUp);
    }

    #[test]
    fn unknown_health_is_configurable() {
        assert!(InstanceStatus::Unknown.is_healthy(true));
        assert!(!InstanceStatus::Unknown.is_healthy(false));
        assert!(!InstanceStatus::NotUp.is_healthy(true));
    }

    #[test]
    fn dto_defaults_status_to_up() {
        let dto = ServiceInstanceDto::from(RegistryInstance::new("a", "a-1", "localhost", 8080));
        assert_eq!(dto.status, "UP");
        assert_eq!(dto.instance_status(), InstanceStatus::Unknown);
        assert_eq!(dto.uri, "http://localhost:8080");
        assert_eq!(dto.scheme, "http");
    }

    #[test]
    fn dto_serializes_camel_case() {
        let dto = ServiceInstanceDto::from(
            RegistryInstance::new("a", "a-1", "10.0.0.1", 443)
                .secured()
                .with_metadata("status", "DOWN"),
        );
        assert_eq!(dto.instance_status(), InstanceStatus::NotUp);

        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(json["serviceId"], "a");
        assert_eq!(json["instanceId"], "a-1");
        assert_eq!(json["uri"], "https://10.0.0.1:443");
        assert_eq!(json["status"], "DOWN");
        assert!(json.get("statusReported").is_none());
    }

    #[test]
    fn health_labels() {
        assert_eq!(ServiceHealth::Unavailable.to_string(), "UNAVAILABLE");
        assert_eq!(InstanceStatus::NotUp.to_string(), "NOT_UP");
    }
}
