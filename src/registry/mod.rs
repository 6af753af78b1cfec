//! Registry client abstraction.
//!
//! This module handles:
//! - The `RegistryClient` trait the discovery facade depends on
//! - Registry instance records
//! - Consul HTTP API client
//! - Mock client for testing

pub mod consul;
pub mod mock;
pub mod types;

use async_trait::async_trait;

use crate::error::RegistryError;

pub use consul::ConsulRegistryClient;
pub use mock::{MockConfig, MockRegistryClient};
pub use types::RegistryInstance;

/// Answers "which services exist" and "which instances does a service have".
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// List the names of all registered services.
    async fn list_services(&self) -> Result<Vec<String>, RegistryError>;

    /// List the current instances of a service. An unknown service yields an empty list.
    async fn list_instances(&self, service_name: &str)
        -> Result<Vec<RegistryInstance>, RegistryError>;

    /// Cheap reachability probe used by health reporting.
    async fn ping(&self) -> Result<(), RegistryError> {
        self.list_services().await.map(|_| ())
    }

    /// Short description for logs and info endpoints.
    fn describe(&self) -> String;
}
