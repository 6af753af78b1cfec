//! REST facade over Consul service discovery.
//!
//! Lists registered services, resolves their instances, aggregates health
//! statistics and validates registration requests. Every response is wrapped
//! in a uniform envelope, and registry calls on the instance path run under a
//! retry, circuit breaker and time limit policy.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types and HTTP status mapping
//! - [`registry`]: Registry client trait, Consul client and mock
//! - [`resilience`]: Retry, circuit breaker and time limiter
//! - [`discovery`]: Discovery facade, statistics and registration checks
//! - [`api`]: HTTP API, envelope and OpenAPI document
//! - [`metrics`]: Prometheus metrics
//! - [`runtime`]: Uptime and host resource snapshots
//! - [`utils`]: Process helpers

pub mod api;
pub mod config;
pub mod discovery;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod resilience;
pub mod runtime;
pub mod utils;

pub use config::Config;
pub use error::{AppError, DiscoveryError, RegistryError, Result};
