//! Registry instance records.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Metadata key carrying an instance's self-reported status.
pub const STATUS_METADATA_KEY: &str = "status";

/// Metadata key flagging an instance as TLS-only.
pub const SECURE_METADATA_KEY: &str = "secure";

/// One running endpoint of a named service as reported by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryInstance {
    /// Service name.
    pub service_id: String,
    /// Unique instance identifier.
    pub instance_id: String,
    /// Host or IP address.
    pub host: String,
    /// Port number.
    pub port: u16,
    /// Whether the instance serves over TLS.
    pub secure: bool,
    /// Registry tags.
    pub tags: Vec<String>,
    /// Free-form metadata.
    pub metadata: HashMap<String, String>,
}

impl RegistryInstance {
    /// Create a plain-HTTP instance with no tags or metadata.
    pub fn new(
        service_id: impl Into<String>,
        instance_id: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            service_id: service_id.into(),
            instance_id: instance_id.into(),
            host: host.into(),
            port,
            secure: false,
            tags: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Add a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Add metadata.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Mark the instance as secure.
    pub fn secured(mut self) -> Self {
        self.secure = true;
        self
    }

    /// URI scheme.
    pub fn scheme(&self) -> &'static str {
        if self.secure {
            "https"
        } else {
            "http"
        }
    }

    /// Full instance URI. IPv6 hosts are bracketed.
    pub fn uri(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("{}://[{}]:{}", self.scheme(), self.host, self.port)
        } else {
            format!("{}://{}:{}", self.scheme(), self.host, self.port)
        }
    }

    /// Self-reported status from metadata, if any.
    pub fn reported_status(&self) -> Option<&str> {
        self.metadata.get(STATUS_METADATA_KEY).map(String::as_str)
    }
}
