//! Registration request validation.
//!
//! Registration is validate-only: an accepted request is acknowledged and
//! logged but never written to the registry.

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

use crate::error::{DiscoveryError, Result};

/// Allowed characters in a service name.
static SERVICE_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("valid regex"));

const MAX_PORT: i64 = 65535;

fn default_health_check_path() -> String {
    "/actuator/health".to_string()
}

fn default_health_check_interval() -> u32 {
    15
}

fn default_scheme() -> String {
    "http".to_string()
}

/// Treat an explicit `null` like an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_default_path<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(Option::deserialize(deserializer)?.unwrap_or_else(default_health_check_path))
}

fn null_as_default_interval<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u32, D::Error> {
    Ok(Option::deserialize(deserializer)?.unwrap_or_else(default_health_check_interval))
}

fn null_as_default_scheme<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(Option::deserialize(deserializer)?.unwrap_or_else(default_scheme))
}

/// Body of `POST /api/v1/consul/register`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    /// Letters, digits, hyphens and underscores only.
    #[schema(example = "billing-service")]
    pub service_name: Option<String>,
    #[schema(example = "10.0.0.12")]
    pub host: Option<String>,
    /// 1 to 65535.
    #[schema(example = 8080)]
    pub port: Option<i64>,
    /// Defaults to `serviceName:host:port`.
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub secure: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: HashMap<String, String>,
    #[serde(
        default = "default_health_check_path",
        deserialize_with = "null_as_default_path"
    )]
    pub health_check_path: String,
    /// Seconds.
    #[serde(
        default = "default_health_check_interval",
        deserialize_with = "null_as_default_interval"
    )]
    pub health_check_interval: u32,
    #[serde(default = "default_scheme", deserialize_with = "null_as_default_scheme")]
    pub scheme: String,
}

impl RegistrationRequest {
    /// Minimal request with defaults for everything optional.
    pub fn new(service_name: impl Into<String>, host: impl Into<String>, port: i64) -> Self {
        Self {
            service_name: Some(service_name.into()),
            host: Some(host.into()),
            port: Some(port),
            instance_id: None,
            secure: false,
            tags: Vec::new(),
            metadata: HashMap::new(),
            health_check_path: default_health_check_path(),
            health_check_interval: default_health_check_interval(),
            scheme: default_scheme(),
        }
    }

    /// Field-level validation. Every failing field is reported.
    pub fn validate(&self) -> Result<()> {
        let mut errors = BTreeMap::new();

        match self.service_name.as_deref() {
            None => {
                errors.insert("serviceName".to_string(), "Service name is required".to_string());
            }
            Some(name) if name.trim().is_empty() => {
                errors.insert("serviceName".to_string(), "Service name is required".to_string());
            }
            Some(name) if !SERVICE_NAME_PATTERN.is_match(name) => {
                errors.insert(
                    "serviceName".to_string(),
                    "Service name can only contain letters, numbers, hyphens and underscores"
                        .to_string(),
                );
            }
            Some(_) => {}
        }

        if blank(self.host.as_deref()) {
            errors.insert("host".to_string(), "Host is required".to_string());
        }

        match self.port {
            None => {
                errors.insert("port".to_string(), "Port is required".to_string());
            }
            Some(p) if p <= 0 => {
                errors.insert("port".to_string(), "Port must be positive".to_string());
            }
            Some(p) if p > MAX_PORT => {
                errors.insert(
                    "port".to_string(),
                    "Port must be between 1 and 65535".to_string(),
                );
            }
            Some(_) => {}
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(DiscoveryError::Validation(errors))
        }
    }

    /// Explicit instance id, or `serviceName:host:port`.
    pub fn effective_instance_id(&self) -> String {
        match self.instance_id.as_deref() {
            Some(id) if !id.trim().is_empty() => id.to_string(),
            _ => format!(
                "{}:{}:{}",
                self.service_name.as_deref().unwrap_or_default(),
                self.host.as_deref().unwrap_or_default(),
                self.port.unwrap_or_default()
            ),
        }
    }
}

fn blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}

/// Acknowledgement of an accepted registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationAck {
    /// `Service '<name>' registered successfully`.
    pub message: String,
    pub service_name: String,
    pub instance_id: String,
}

/// Check the minimal registration invariants and build the acknowledgement.
///
/// Failures are reported as [`DiscoveryError::RegistrationFailed`].
pub fn accept(request: &RegistrationRequest) -> Result<RegistrationAck> {
    let name = match request.service_name.as_deref() {
        Some(n) if !n.trim().is_empty() => n,
        _ => return Err(DiscoveryError::RegistrationFailed("Service name is required".into())),
    };

    if blank(request.host.as_deref()) {
        return Err(DiscoveryError::RegistrationFailed("Host is required".into()));
    }

    match request.port {
        Some(p) if (1..=MAX_PORT).contains(&p) => {}
        _ => {
            return Err(DiscoveryError::RegistrationFailed(
                "Port must be between 1 and 65535".into(),
            ))
        }
    }

    Ok(RegistrationAck {
        message: format!("Service '{}' registered successfully", name),
        service_name: name.to_string(),
        instance_id: request.effective_instance_id(),
    })
}
