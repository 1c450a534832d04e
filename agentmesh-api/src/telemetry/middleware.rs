//! Axum Middleware for HTTP Request Tracing and Metrics
//!
//! Wraps every request in a tracing span, records Prometheus metrics and
//! logs completion.

use axum::{extract::Request, middleware::Next, response::Response};
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Instant;
use tracing::{info_span, Instrument};

use super::metrics::METRICS;

/// UUID pattern: 8-4-4-4-12 hex chars
static UUID_PATTERN: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
});

/// Numeric path segment
static ID_PATTERN: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| Regex::new(r"/\d+(/|$)"));

/// Normalize path for metrics/spans (replace UUIDs and IDs with placeholders).
///
/// Keeps the `path` label bounded: every agent id collapses to `{id}`.
pub(crate) fn normalize_path(path: &str) -> String {
    let mut result = path.to_string();
    if let Ok(uuid_pattern) = UUID_PATTERN.as_ref() {
        result = uuid_pattern.replace_all(&result, "{id}").into_owned();
    }
    if let Ok(id_pattern) = ID_PATTERN.as_ref() {
        result = id_pattern.replace_all(&result, "/{id}$1").into_owned();
    }
    result
}

/// Observability middleware for Axum.
///
/// 1. `http_request` span around the handler
/// 2. Prometheus request counter and latency histogram
/// 3. Completion log line
pub async fn observability_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let normalized_path = normalize_path(&path);

    let span = info_span!(
        "http_request",
        http.method = %method,
        http.target = %path,
        http.route = %normalized_path,
    );

    let response = next.run(request).instrument(span).await;

    let duration = start.elapsed();
    let status = response.status();

    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_http_request(
            method.as_str(),
            &normalized_path,
            status.as_u16(),
            duration.as_secs_f64(),
        );
    }

    tracing::info!(
        method = %method,
        path = %path,
        status = status.as_u16(),
        duration_ms = duration.as_millis() as u64,
        "Request completed"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/agents/0191d2c5-7b3a-7cc0-9a51-1f2e3d4c5b6a/call";
        assert_eq!(normalize_path(path), "/agents/{id}/call");
    }

    #[test]
    fn test_normalize_path_numeric_id() {
        assert_eq!(normalize_path("/directory/agents/42"), "/directory/agents/{id}");
        assert_eq!(normalize_path("/directory/agents/42/status"), "/directory/agents/{id}/status");
    }

    #[test]
    fn test_normalize_path_static() {
        assert_eq!(normalize_path("/health/ready"), "/health/ready");
        assert_eq!(normalize_path("/messages"), "/messages");
    }
}
