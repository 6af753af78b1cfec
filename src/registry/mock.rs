//! Mock registry client for unit testing.
//!
//! This module provides a mock client that can be used in tests
//! without talking to a real Consul agent.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::types::RegistryInstance;
use super::RegistryClient;
use crate::error::RegistryError;

/// Configuration for mock client behavior.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Whether to fail service listing.
    pub fail_services: bool,
    /// Whether to fail instance lookups.
    pub fail_instances: bool,
    /// Fail this many calls (of either kind) before answering normally.
    pub transient_failures: u32,
    /// Simulated latency in milliseconds.
    pub latency_ms: u64,
}

/// Mock registry client for testing.
#[derive(Debug, Clone, Default)]
pub struct MockRegistryClient {
    /// Mock configuration.
    config: MockConfig,
    /// Registered instances by service name. A name with no instances is still listed.
    services: Arc<Mutex<BTreeMap<String, Vec<RegistryInstance>>>>,
    /// Remaining transient failures.
    remaining_failures: Arc<AtomicU32>,
    /// Number of `list_services` calls received.
    service_calls: Arc<AtomicU32>,
    /// Number of `list_instances` calls received.
    instance_calls: Arc<AtomicU32>,
}

impl MockRegistryClient {
    /// Create a new mock client with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock client with custom configuration.
    pub fn with_config(config: MockConfig) -> Self {
        let remaining = config.transient_failures;
        Self {
            config,
            remaining_failures: Arc::new(AtomicU32::new(remaining)),
            ..Self::default()
        }
    }

    fn services(&self) -> MutexGuard<'_, BTreeMap<String, Vec<RegistryInstance>>> {
        self.services.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a service name with no instances.
    pub fn add_service(&self, name: impl Into<String>) {
        self.services().entry(name.into()).or_default();
    }

    /// Add an instance; its service is registered as needed.
    pub fn add_instance(&self, instance: RegistryInstance) {
        self.services()
            .entry(instance.service_id.clone())
            .or_default()
            .push(instance);
    }

    /// Clear all mock data.
    pub fn clear(&self) {
        self.services().clear();
    }

    /// Number of `list_services` calls received.
    pub fn service_calls(&self) -> u32 {
        self.service_calls.load(Ordering::SeqCst)
    }

    /// Number of `list_instances` calls received.
    pub fn instance_calls(&self) -> u32 {
        self.instance_calls.load(Ordering::SeqCst)
    }

    async fn simulate(&self, always_fail: bool, what: &str) -> Result<(), RegistryError> {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.config.latency_ms)).await;
        }

        if always_fail {
            return Err(RegistryError::Unavailable(format!("mock {} failure", what)));
        }

        let transient = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if transient {
            return Err(RegistryError::Unavailable(format!(
                "mock transient {} failure",
                what
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl RegistryClient for MockRegistryClient {
    async fn list_services(&self) -> Result<Vec<String>, RegistryError> {
        self.service_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate(self.config.fail_services, "services").await?;
        Ok(self.services().keys().cloned().collect())
    }

    async fn list_instances(
        &self,
        service_name: &str,
    ) -> Result<Vec<RegistryInstance>, RegistryError> {
        self.instance_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate(self.config.fail_instances, "instances").await?;
        Ok(self
            .services()
            .get(service_name)
            .cloned()
            .unwrap_or_default())
    }

    fn describe(&self) -> String {
        "mock registry".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_registered_services_sorted() {
        let mock = MockRegistryClient::new();
        mock.add_service("zeta");
        mock.add_instance(RegistryInstance::new("alpha", "alpha-1", "localhost", 8080));

        let services = mock.list_services().await.unwrap();
        assert_eq!(services, vec!["alpha".to_string(), "zeta".to_string()]);
        assert_eq!(mock.service_calls(), 1);
    }

    #[tokio::test]
    async fn unknown_service_has_no_instances() {
        let mock = MockRegistryClient::new();
        let instances = mock.list_instances("missing").await.unwrap();
        assert!(instances.is_empty());
        assert_eq!(mock.instance_calls(), 1);
    }

    #[tokio::test]
    async fn transient_failures_run_out() {
        let mock = MockRegistryClient::with_config(MockConfig {
            transient_failures: 2,
            ..MockConfig::default()
        });

        assert!(mock.list_services().await.is_err());
        assert!(mock.list_services().await.is_err());
        assert!(mock.list_services().await.is_ok());
    }

    #[tokio::test]
    async fn configured_failure_is_permanent() {
        let mock = MockRegistryClient::with_config(MockConfig {
            fail_instances: true,
            ..MockConfig::default()
        });

        assert!(mock.list_instances("a").await.is_err());
        assert!(mock.list_instances("a").await.is_err());
        assert!(mock.list_services().await.is_ok());
    }

    #[tokio::test]
    async fn clones_share_state() {
        let mock = MockRegistryClient::new();
        let handle = mock.clone();
        handle.add_service("shared");
        mock.ping().await.unwrap();
        assert_eq!(mock.list_services().await.unwrap(), vec!["shared".to_string()]);
        assert_eq!(handle.service_calls(), 2);
        handle.clear();
        assert!(mock.list_services().await.unwrap().is_empty());
    }
}
