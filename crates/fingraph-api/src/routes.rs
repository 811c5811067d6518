//! API routes.

use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::chats::{
    create_chat, delete_chat, get_chat, list_chats, submit_chat_query, update_chat,
};
use crate::handlers::events::stream_events;
use crate::handlers::graph::{list_companies, list_filings};
use crate::handlers::health::health;
use crate::handlers::jobs::{get_job_status, submit_query};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit, security_headers, trace_requests, QueryRateLimiter,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let query_routes = Router::new()
        .route("/query", post(submit_query))
        .route("/jobs/:job_id", get(get_job_status))
        .route("/events/:job_id", get(stream_events));

    let graph_routes = Router::new()
        .route("/companies", get(list_companies))
        .route("/filings/:company_id", get(list_filings));

    let chat_routes = Router::new()
        .route("/chats", post(create_chat))
        .route("/chats", get(list_chats))
        .route("/chats/:chat_id", get(get_chat))
        .route("/chats/:chat_id", put(update_chat))
        .route("/chats/:chat_id", delete(delete_chat))
        .route("/chats/:chat_id/query", post(submit_chat_query));

    // Create rate limiter for API routes
    let rate_limiter = std::sync::Arc::new(QueryRateLimiter::new(state.config.rate_limit_rps));

    let api_routes = Router::new()
        .merge(query_routes)
        .merge(graph_routes)
        .merge(chat_routes)
        .layer(middleware::from_fn_with_state(rate_limiter, rate_limit))
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size));

    let health_routes = Router::new().route("/health", get(health));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(trace_requests))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
