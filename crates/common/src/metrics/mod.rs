//! Metrics and observability utilities
//!
//! Prometheus metrics through the `metrics` facade. Recording is a no-op
//! until a recorder is installed by the binary.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all DocQA metrics
pub const METRICS_PREFIX: &str = "docqa";

/// Histogram buckets for HTTP request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.00, 30.00, 60.00,
];

/// Buckets for upstream model calls (typically slower)
pub const UPSTREAM_BUCKETS: &[f64] = &[
    0.050, 0.100, 0.250, 0.500, 1.000, 2.000, 5.000, 10.00, 30.00, 60.00,
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Ingestion metrics
    describe_counter!(
        format!("{}_documents_ingested_total", METRICS_PREFIX),
        Unit::Count,
        "Total documents ingested"
    );

    describe_counter!(
        format!("{}_chunks_created_total", METRICS_PREFIX),
        Unit::Count,
        "Total chunks created"
    );

    describe_histogram!(
        format!("{}_ingestion_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Document ingestion latency in seconds"
    );

    // Question answering
    describe_counter!(
        format!("{}_questions_answered_total", METRICS_PREFIX),
        Unit::Count,
        "Total questions answered"
    );

    describe_counter!(
        format!("{}_tokens_used_total", METRICS_PREFIX),
        Unit::Count,
        "Tokens billed by upstream model calls"
    );

    // Upstream metrics
    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    describe_counter!(
        format!("{}_embedding_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API errors"
    );

    describe_counter!(
        format!("{}_completion_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total chat-completion API requests"
    );

    describe_histogram!(
        format!("{}_completion_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Chat-completion latency in seconds"
    );

    describe_counter!(
        format!("{}_completion_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total chat-completion API errors"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

fn record_upstream(kind: &str, duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_{}_requests_total", METRICS_PREFIX, kind),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_{}_duration_seconds", METRICS_PREFIX, kind),
            "model" => model.to_string()
        )
        .record(duration_secs);
    } else {
        counter!(
            format!("{}_{}_errors_total", METRICS_PREFIX, kind),
            "model" => model.to_string()
        )
        .increment(1);
    }
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, success: bool) {
    record_upstream("embedding", duration_secs, model, success);
}

/// Helper to record chat-completion metrics
pub fn record_completion(duration_secs: f64, model: &str, success: bool) {
    record_upstream("completion", duration_secs, model, success);
}

/// Helper to record ingestion metrics
pub fn record_ingestion(duration_secs: f64, chunks_created: usize, embedding_tokens: u32) {
    counter!(format!("{}_documents_ingested_total", METRICS_PREFIX)).increment(1);

    counter!(format!("{}_chunks_created_total", METRICS_PREFIX))
        .increment(chunks_created as u64);

    histogram!(format!("{}_ingestion_duration_seconds", METRICS_PREFIX))
        .record(duration_secs);

    record_tokens("embedding", embedding_tokens);
}

/// Helper to record an answered question
pub fn record_question(model: &str, embedding_tokens: u32, completion_tokens: u32) {
    counter!(
        format!("{}_questions_answered_total", METRICS_PREFIX),
        "model" => model.to_string()
    )
    .increment(1);

    record_tokens("embedding", embedding_tokens);
    record_tokens("completion", completion_tokens);
}

fn record_tokens(kind: &str, tokens: u32) {
    counter!(
        format!("{}_tokens_used_total", METRICS_PREFIX),
        "kind" => kind.to_string()
    )
    .increment(tokens as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_are_sorted() {
        for buckets in [LATENCY_BUCKETS, UPSTREAM_BUCKETS] {
            assert!(buckets.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_recording_without_recorder() {
        let metrics = RequestMetrics::start("GET", "/v1/document/");
        metrics.finish(200);
        record_question("gpt-3.5-turbo", 5, 12);
        record_ingestion(0.5, 3, 40);
        // Just verify it runs without panic
    }
}
