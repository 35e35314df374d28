//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with latency-aligned histograms
//! and standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all ResearchGraph metrics
pub const METRICS_PREFIX: &str = "researchgraph";

/// Histogram buckets for HTTP request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms - cache hit target
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
];

/// Buckets for model calls (embedding and generation are slower)
pub const MODEL_BUCKETS: &[f64] = &[
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
    60.00,  // 60s
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

    // Chat metrics
    describe_counter!(
        format!("{}_chat_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Answered chat requests by source (cache or llm)"
    );

    describe_counter!(
        format!("{}_cache_hits_total", METRICS_PREFIX),
        Unit::Count,
        "Total answer cache hits"
    );

    describe_counter!(
        format!("{}_cache_misses_total", METRICS_PREFIX),
        Unit::Count,
        "Total answer cache misses"
    );

    describe_counter!(
        format!("{}_cache_write_conflicts_total", METRICS_PREFIX),
        Unit::Count,
        "Cache writes that lost a race to a concurrent writer"
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

    // Generation metrics
    describe_histogram!(
        format!("{}_generation_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Answer generation latency in seconds"
    );

    describe_counter!(
        format!("{}_generation_tokens_total", METRICS_PREFIX),
        Unit::Count,
        "Tokens consumed by answer generation"
    );

    describe_counter!(
        format!("{}_generation_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Failed generation calls"
    );

    // Retrieval metrics
    describe_histogram!(
        format!("{}_retrieval_results", METRICS_PREFIX),
        Unit::Count,
        "Chunks returned per retrieval"
    );

    // Graph and discovery metrics
    describe_counter!(
        format!("{}_graph_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Citation graph fetches and expansions"
    );

    describe_counter!(
        format!("{}_discovery_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Topic discovery requests by ordering outcome"
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

/// Record an answered chat request (`source` is "cache" or "llm")
pub fn record_chat(source: &str) {
    counter!(
        format!("{}_chat_requests_total", METRICS_PREFIX),
        "source" => source.to_string()
    )
    .increment(1);
}

/// Helper to record answer cache lookups
pub fn record_cache(hit: bool) {
    if hit {
        counter!(format!("{}_cache_hits_total", METRICS_PREFIX)).increment(1);
    } else {
        counter!(format!("{}_cache_misses_total", METRICS_PREFIX)).increment(1);
    }
}

pub fn record_cache_conflict() {
    counter!(format!("{}_cache_write_conflicts_total", METRICS_PREFIX)).increment(1);
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, success: bool) {
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
            "model" => model.to_string()
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

/// Helper to record generation metrics
pub fn record_generation(duration_secs: f64, model: &str, tokens: Option<u32>, success: bool) {
    if !success {
        counter!(
            format!("{}_generation_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(1);
        return;
    }

    histogram!(
        format!("{}_generation_duration_seconds", METRICS_PREFIX),
        "model" => model.to_string()
    )
    .record(duration_secs);

    if let Some(tokens) = tokens {
        counter!(
            format!("{}_generation_tokens_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(u64::from(tokens));
    }
}

pub fn record_retrieval(result_count: usize) {
    histogram!(format!("{}_retrieval_results", METRICS_PREFIX)).record(result_count as f64);
}

/// `kind` is "fetch" or "expand"
pub fn record_graph(kind: &str) {
    counter!(
        format!("{}_graph_requests_total", METRICS_PREFIX),
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// `ordering` is "ranked" or "fallback"
pub fn record_discovery(ordering: &str) {
    counter!(
        format!("{}_discovery_requests_total", METRICS_PREFIX),
        "ordering" => ordering.to_string()
    )
    .increment(1);
}
