//! Unified error types for the discovery service.

use std::collections::BTreeMap;

use axum::http::StatusCode;
use thiserror::Error;

/// Top-level error for start-up and CLI commands.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Configuration loaded but failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Registry client error.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Malformed URL.
    #[error("url error: {0}")]
    Url(#[from] url::ParseError),
}

/// Errors raised by a registry client implementation.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// HTTP request to the registry failed.
    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Registry answered with a non-success status.
    #[error("registry returned HTTP {status} for {path}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Request path.
        path: String,
    },

    /// Registry response could not be decoded.
    #[error("failed to parse registry response: {0}")]
    Parse(String),

    /// Registry is unreachable.
    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by discovery operations and mapped onto HTTP responses.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// Registry could not be reached or answered with an error.
    #[error("{message}")]
    ConnectionFailed {
        /// What was being attempted.
        message: String,
        /// Underlying registry failure.
        #[source]
        source: RegistryError,
    },

    /// Circuit breaker rejected the call without trying.
    #[error("circuit breaker '{name}' is open")]
    CircuitOpen {
        /// Policy name.
        name: String,
    },

    /// A single attempt exceeded the time limit.
    #[error("registry call timed out after {timeout_ms}ms")]
    Timeout {
        /// Configured limit.
        timeout_ms: u64,
    },

    /// Registry reports zero instances for the service.
    #[error("Service '{0}' not found in Consul registry")]
    ServiceNotFound(String),

    /// Caller supplied an unusable argument.
    #[error("{0}")]
    InvalidArgument(String),

    /// Request body failed field validation.
    #[error("Validation failed")]
    Validation(BTreeMap<String, String>),

    /// Registration request was rejected.
    #[error("Failed to register service: {0}")]
    RegistrationFailed(String),

    /// Configuration property does not exist.
    #[error("Property '{0}' not found")]
    PropertyNotFound(String),

    /// No route matches the request path.
    #[error("No endpoint at {0}")]
    RouteNotFound(String),

    /// Anything not otherwise classified.
    #[error("{0}")]
    Internal(String),
}

impl DiscoveryError {
    /// Wrap a registry failure with a description of the attempted call.
    pub fn connection(message: impl Into<String>, source: RegistryError) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
            source,
        }
    }

    /// HTTP status code for the error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ConnectionFailed { .. } | Self::CircuitOpen { .. } | Self::Timeout { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::ServiceNotFound(_) | Self::PropertyNotFound(_) | Self::RouteNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::InvalidArgument(_) | Self::Validation(_) | Self::RegistrationFailed(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error code placed in the response envelope.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConnectionFailed { .. } => "CONSUL_CONNECTION_FAILED",
            Self::CircuitOpen { .. } => "CIRCUIT_OPEN",
            Self::Timeout { .. } => "CONSUL_TIMEOUT",
            Self::ServiceNotFound(_) => "SERVICE_NOT_FOUND",
            Self::InvalidArgument(_) => "ILLEGAL_ARGUMENT",
            Self::Validation(_) => "VALIDATION_FAILED",
            Self::RegistrationFailed(_) => "SERVICE_REGISTRATION_FAILED",
            Self::PropertyNotFound(_) => "PROPERTY_NOT_FOUND",
            Self::RouteNotFound(_) => "NOT_FOUND",
            Self::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Whether the resilience policy may retry and count this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionFailed { .. } | Self::Timeout { .. })
    }

    /// Message safe to show to clients.
    ///
    /// Internal failures are replaced with a generic message.
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "An unexpected error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, DiscoveryError>;
