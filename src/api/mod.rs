//! HTTP API module for discovery, health, metrics and configuration endpoints.

pub mod envelope;
pub mod handlers;
pub mod openapi;
pub mod routes;
pub mod system;

pub use envelope::{ApiError, ApiResponse, ApiResult};
pub use handlers::AppState;
pub use routes::create_router;
