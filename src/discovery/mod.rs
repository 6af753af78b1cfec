//! Discovery facade.
//!
//! This module handles:
//! - Service listing, with and without the resilience policy
//! - Instance lookup and mapping to response DTOs
//! - Statistics aggregation
//! - Validate-only registration

pub mod registration;
pub mod service;
pub mod stats;
pub mod types;

pub use registration::{RegistrationAck, RegistrationRequest};
pub use service::DiscoveryService;
pub use stats::StatsBuilder;
pub use types::{InstanceStatus, ServiceHealth, ServiceInstanceDto, ServiceStats};
