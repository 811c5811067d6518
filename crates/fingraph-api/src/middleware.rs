//! API middleware: per-client rate limiting, CORS, response headers and
//! request tracing.

use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::header::{HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use axum::http::{Method, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::metrics;

/// Keys tracked before stale per-client state is swept.
const LIMITER_SWEEP_THRESHOLD: usize = 10_000;

/// Per-client request limiter for the query endpoints, keyed by source
/// address.
pub struct QueryRateLimiter {
    limiter: RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>,
}

impl QueryRateLimiter {
    /// Create a limiter allowing `requests_per_second` per client.
    pub fn new(requests_per_second: u32) -> Self {
        let per_second = NonZeroU32::new(requests_per_second.max(1)).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::keyed(Quota::per_second(per_second)),
        }
    }

    /// Whether this client may proceed.
    pub fn allow(&self, client: IpAddr) -> bool {
        if self.limiter.len() > LIMITER_SWEEP_THRESHOLD {
            self.limiter.retain_recent();
        }
        self.limiter.check_key(&client).is_ok()
    }
}

/// Reject clients that exceed their per-second quota.
pub async fn rate_limit(
    State(limiter): State<Arc<QueryRateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    match client_addr(&request) {
        Some(client) if !limiter.allow(client) => {
            warn!(client = %client, path = request.uri().path(), "Rate limit exceeded");
            metrics::record_rate_limit_hit(request.uri().path());
            (
                StatusCode::TOO_MANY_REQUESTS,
                [("Retry-After", "1")],
                "Rate limit exceeded. Please try again later.",
            )
                .into_response()
        }
        _ => next.run(request).await,
    }
}

/// Source address of a request. Behind the frontend proxy the connection
/// address is the proxy itself, so a forwarded header wins when present.
fn client_addr(request: &Request<Body>) -> Option<IpAddr> {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|chain| chain.split(',').next())
        .and_then(|first| first.trim().parse().ok());

    forwarded.or_else(|| {
        request
            .extensions()
            .get::<ConnectInfo<std::net::SocketAddr>>()
            .map(|info| info.0.ip())
    })
}

/// CORS for the browser frontend.
///
/// Credentials stay enabled for the configured origins, and `Last-Event-ID`
/// is allowed so EventSource reconnects can resume a job stream.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|origin| origin == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            CONTENT_TYPE,
            ACCEPT,
            HeaderName::from_static("last-event-id"),
        ])
        .allow_credentials(true)
}

/// Baseline response headers for a JSON/SSE API that renders nothing and
/// must never be framed or sniffed.
pub async fn security_headers(request: Request<Body>, next: Next) -> Response<Body> {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert("Referrer-Policy", HeaderValue::from_static("no-referrer"));

    response
}

/// Tag each request with an id and log its outcome.
///
/// An inbound `X-Request-ID` is kept so the frontend can correlate its own
/// traces; the id is echoed back on the response either way. Health and
/// metrics scrapes stay out of the log.
pub async fn trace_requests(mut request: Request<Body>, next: Next) -> Response<Body> {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(request_id.clone());

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let mut response = next.run(request).await;

    if path != "/health" && path != "/metrics" {
        info!(
            request_id = %request_id,
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Request completed"
        );
    }

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("X-Request-ID", value);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_allows_then_throttles() {
        let limiter = QueryRateLimiter::new(1);
        let client: IpAddr = "10.0.0.1".parse().unwrap();

        assert!(limiter.allow(client));
        // The burst for one request per second is exhausted immediately.
        assert!(!limiter.allow(client));

        // Another client has its own quota.
        let other: IpAddr = "10.0.0.2".parse().unwrap();
        assert!(limiter.allow(other));
    }

    #[test]
    fn test_client_addr_prefers_forwarded_header() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();

        assert_eq!(client_addr(&request), Some("203.0.113.7".parse().unwrap()));
    }

    #[test]
    fn test_client_addr_without_hints_is_none() {
        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_addr(&request), None);
    }
}
