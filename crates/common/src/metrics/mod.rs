//! Metrics and observability utilities
//!
//! Prometheus metrics with standardized naming conventions. Recording is a
//! no-op until an exporter is installed by the binary.

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram,
    gauge, histogram, Unit,
};
use std::time::Instant;

/// Metrics prefix for all SchemeBot metrics
pub const METRICS_PREFIX: &str = "schemebot";

/// Histogram buckets for chat latency (in seconds); dominated by the LLM call
pub const CHAT_LATENCY_BUCKETS: &[f64] = &[
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    4.000,  // 4s
    8.000,  // 8s
    15.00,  // 15s
    30.00,  // 30s
    60.00,  // 60s
];

/// Buckets for embedding and retrieval latency
pub const EMBEDDING_BUCKETS: &[f64] = &[
    0.010,  // 10ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    10.00,  // 10s
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

    // Chat pipeline metrics
    describe_counter!(
        format!("{}_chat_answers_total", METRICS_PREFIX),
        Unit::Count,
        "Answers produced, labelled by outcome"
    );

    describe_histogram!(
        format!("{}_chat_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end pipeline latency in seconds"
    );

    describe_histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Vector search latency in seconds"
    );

    describe_gauge!(
        format!("{}_retrieval_matches_kept", METRICS_PREFIX),
        Unit::Count,
        "Matches that passed the relevance cutoff on the last query"
    );

    describe_counter!(
        format!("{}_retrieval_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Vector searches that failed or returned malformed results"
    );

    describe_histogram!(
        format!("{}_llm_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "LLM call latency in seconds"
    );

    describe_counter!(
        format!("{}_llm_errors_total", METRICS_PREFIX),
        Unit::Count,
        "LLM calls that failed and were answered with the apology text"
    );

    // Embedding metrics
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

    // Indexing metrics
    describe_counter!(
        format!("{}_schemes_indexed_total", METRICS_PREFIX),
        Unit::Count,
        "Scheme documents written to the vector index"
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

/// Helper to record a completed pipeline run
pub fn record_chat(duration_secs: f64, degraded: bool) {
    let outcome = if degraded { "degraded" } else { "answered" };

    counter!(
        format!("{}_chat_answers_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);

    histogram!(format!("{}_chat_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Helper to record retrieval metrics
pub fn record_retrieval(duration_secs: f64, matches_kept: usize, success: bool) {
    histogram!(format!("{}_retrieval_duration_seconds", METRICS_PREFIX)).record(duration_secs);

    if success {
        gauge!(format!("{}_retrieval_matches_kept", METRICS_PREFIX)).set(matches_kept as f64);
    } else {
        counter!(format!("{}_retrieval_failures_total", METRICS_PREFIX)).increment(1);
    }
}

/// Helper to record LLM call metrics
pub fn record_llm(duration_secs: f64, model: &str, success: bool) {
    histogram!(
        format!("{}_llm_duration_seconds", METRICS_PREFIX),
        "model" => model.to_string()
    )
    .record(duration_secs);

    if !success {
        counter!(
            format!("{}_llm_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(1);
    }
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string(),
            "batch" => if batch_size > 1 { "batch" } else { "single" }
        )
        .record(duration_secs);
    } else {
        counter!(
            format!("{}_embedding_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(1);
    }
}

/// Helper to record indexing metrics
pub fn record_indexed(documents: usize) {
    counter!(format!("{}_schemes_indexed_total", METRICS_PREFIX)).increment(documents as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_sorted() {
        for buckets in [CHAT_LATENCY_BUCKETS, EMBEDDING_BUCKETS] {
            let mut prev = 0.0;
            for &bucket in buckets {
                assert!(bucket > prev);
                prev = bucket;
            }
        }
    }

    #[test]
    fn test_recording_without_exporter() {
        let metrics = RequestMetrics::start("POST", "/api/chat");
        metrics.finish(200);
        record_chat(1.2, false);
        record_retrieval(0.05, 3, true);
        record_llm(0.9, "gemini-flash-latest", false);
        // Just verify it runs without panic
    }
}
