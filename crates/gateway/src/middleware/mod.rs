//! Request logging and metrics middleware

use axum::{
    extract::{MatchedPath, Request},
    http::header,
    middleware::Next,
    response::Response,
};
use docqa_common::metrics::RequestMetrics;
use std::time::{Duration, Instant};

/// Requests slower than this are logged at WARN
pub const SLOW_REQUEST_THRESHOLD: Duration = Duration::from_secs(10);

/// Log method, path, host and processing time of every request
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let start = Instant::now();
    let response = next.run(request).await;
    let elapsed = start.elapsed();
    let status = response.status().as_u16();

    if elapsed > SLOW_REQUEST_THRESHOLD {
        tracing::warn!(
            %method,
            %path,
            %host,
            status,
            elapsed_ms = elapsed.as_millis() as u64,
            "Slow request"
        );
    } else {
        tracing::info!(
            %method,
            %path,
            %host,
            status,
            elapsed_ms = elapsed.as_millis() as u64,
            "Request processed"
        );
    }

    response
}

/// Count and time matched routes, labelled by route template
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let metrics = RequestMetrics::start(request.method().as_str(), &endpoint);
    let response = next.run(request).await;
    metrics.finish(response.status().as_u16());

    response
}
