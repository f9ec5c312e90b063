//! Axum HTTP API for the FaceFX image filters.
//!
//! This crate provides:
//! - Multipart upload endpoints for each filter
//! - Liveness, readiness and schema endpoints
//! - Request id, logging and security header middleware
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
