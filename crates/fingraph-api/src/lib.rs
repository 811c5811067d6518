//! Axum HTTP/SSE API server.
//!
//! This crate provides:
//! - Query submission and job status endpoints
//! - SSE streaming of per-job events with history replay
//! - Chat CRUD backed by the chat store
//! - Rate limiting, security headers and Prometheus metrics

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
