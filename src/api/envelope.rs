//! Uniform response envelope and error translation.

use std::collections::BTreeMap;

use axum::extract::OriginalUri;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use utoipa::ToSchema;

use crate::error::DiscoveryError;
use crate::metrics;

/// Wrapper returned by every JSON endpoint.
///
/// `success == false` always comes with an `error` code.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
    /// Error code, set on failures only.
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Request path.
    pub path: Option<String>,
}

/// Error body: `data` carries field errors for validation failures.
pub type ErrorResponse = ApiResponse<BTreeMap<String, String>>;

impl<T> ApiResponse<T> {
    /// Successful response carrying `data`.
    pub fn success(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
            path: None,
        }
    }

    /// Failed response with an error code and no data.
    pub fn failure(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
            path: None,
        }
    }

    /// Attach the request path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// A [`DiscoveryError`] tied to the request that produced it.
#[derive(Debug)]
pub struct ApiError {
    error: DiscoveryError,
    path: Option<String>,
}

/// Result type for envelope handlers.
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Attach a request path to an error.
    pub fn new(error: DiscoveryError, path: impl Into<String>) -> Self {
        Self {
            error,
            path: Some(path.into()),
        }
    }

    /// Closure that wraps errors with the path of `uri`, for use with `map_err`.
    pub fn at(uri: &OriginalUri) -> impl FnOnce(DiscoveryError) -> Self + '_ {
        move |error| Self::new(error, uri.0.path())
    }
}

impl From<DiscoveryError> for ApiError {
    fn from(error: DiscoveryError) -> Self {
        Self { error, path: None }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.error.status_code();
        let code = self.error.error_code();

        if status.is_server_error() {
            error!(code, path = ?self.path, error = %self.error, "Request failed");
        } else {
            warn!(code, path = ?self.path, error = %self.error, "Request rejected");
        }
        metrics::inc_http_errors(code);

        let data = match &self.error {
            DiscoveryError::Validation(fields) => Some(fields.clone()),
            _ => None,
        };

        let body = ErrorResponse {
            data,
            path: self.path,
            ..ApiResponse::failure(self.error.public_message(), code)
        };

        (status, Json(body)).into_response()
    }
}
