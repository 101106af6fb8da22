//! Prometheus metrics for examsearch
//!
//! Search, embedding, and catalog counters exposed on `/metrics` and by
//! `examsearch stats --prometheus`.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::sync::Once;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Search metrics
    // ============================================================================

    /// Search requests by mode (hybrid, semantic, keyword)
    pub static ref SEARCH_REQUESTS: CounterVec = CounterVec::new(
        Opts::new(
            "examsearch_search_requests_total",
            "Total number of search requests"
        ),
        &["mode"]
    ).expect("Failed to create SEARCH_REQUESTS counter");

    /// Search request latency in seconds
    pub static ref SEARCH_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "examsearch_search_latency_seconds",
            "Search request latency in seconds"
        ).buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0])
    ).expect("Failed to create SEARCH_LATENCY histogram");

    /// Number of search results returned per request
    pub static ref SEARCH_RESULTS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "examsearch_search_results_count",
            "Number of search results returned per request"
        ).buckets(vec![0.0, 1.0, 5.0, 10.0, 20.0, 50.0])
    ).expect("Failed to create SEARCH_RESULTS histogram");

    /// Hybrid searches answered from the lexical branch alone
    pub static ref SEARCH_DEGRADED: Counter = Counter::with_opts(
        Opts::new(
            "examsearch_search_degraded_total",
            "Hybrid searches that fell back to lexical-only results"
        )
    ).expect("Failed to create SEARCH_DEGRADED counter");

    /// Failed searches by error kind
    pub static ref SEARCH_ERRORS: CounterVec = CounterVec::new(
        Opts::new(
            "examsearch_search_errors_total",
            "Search requests that returned an error"
        ),
        &["kind"]
    ).expect("Failed to create SEARCH_ERRORS counter");

    // ============================================================================
    // Embedding metrics
    // ============================================================================

    pub static ref EMBEDDING_REQUESTS: Counter = Counter::with_opts(
        Opts::new(
            "examsearch_embedding_requests_total",
            "Total embedding generation requests"
        )
    ).expect("Failed to create EMBEDDING_REQUESTS counter");

    pub static ref EMBEDDING_FAILURES: Counter = Counter::with_opts(
        Opts::new(
            "examsearch_embedding_failures_total",
            "Embedding requests that failed or returned malformed vectors"
        )
    ).expect("Failed to create EMBEDDING_FAILURES counter");

    pub static ref EMBEDDING_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "examsearch_embedding_latency_seconds",
            "Embedding generation latency in seconds"
        ).buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0])
    ).expect("Failed to create EMBEDDING_LATENCY histogram");

    // ============================================================================
    // Catalog metrics
    // ============================================================================

    /// Questions currently stored
    pub static ref STORED_QUESTIONS: Gauge = Gauge::with_opts(
        Opts::new(
            "examsearch_stored_questions",
            "Number of questions in the store"
        )
    ).expect("Failed to create STORED_QUESTIONS gauge");
}

static REGISTER: Once = Once::new();

/// Register all metrics with the global registry. Safe to call more than once.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(SEARCH_REQUESTS.clone()),
            Box::new(SEARCH_LATENCY.clone()),
            Box::new(SEARCH_RESULTS.clone()),
            Box::new(SEARCH_DEGRADED.clone()),
            Box::new(SEARCH_ERRORS.clone()),
            Box::new(EMBEDDING_REQUESTS.clone()),
            Box::new(EMBEDDING_FAILURES.clone()),
            Box::new(EMBEDDING_LATENCY.clone()),
            Box::new(STORED_QUESTIONS.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                tracing::error!("Failed to register metric: {}", e);
            }
        }
    });
}

/// Gather all metrics and encode them in Prometheus text format
///
/// Returns an empty string if encoding fails.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Metrics contained invalid UTF-8: {}", e);
        String::new()
    })
}

/// Current metric values for the CLI stats command.
pub struct MetricSnapshot {
    pub hybrid_requests: f64,
    pub semantic_requests: f64,
    pub keyword_requests: f64,
    pub degraded_searches: f64,
    pub search_latency_avg: f64,
    pub embedding_requests_total: f64,
    pub embedding_failures_total: f64,
    pub embedding_latency_avg: f64,
    pub stored_questions: f64,
}

impl MetricSnapshot {
    pub fn capture() -> Self {
        Self {
            hybrid_requests: SEARCH_REQUESTS.with_label_values(&["hybrid"]).get(),
            semantic_requests: SEARCH_REQUESTS.with_label_values(&["semantic"]).get(),
            keyword_requests: SEARCH_REQUESTS.with_label_values(&["keyword"]).get(),
            degraded_searches: SEARCH_DEGRADED.get(),
            search_latency_avg: calculate_histogram_avg(&SEARCH_LATENCY),
            embedding_requests_total: EMBEDDING_REQUESTS.get(),
            embedding_failures_total: EMBEDDING_FAILURES.get(),
            embedding_latency_avg: calculate_histogram_avg(&EMBEDDING_LATENCY),
            stored_questions: STORED_QUESTIONS.get(),
        }
    }
}

fn calculate_histogram_avg(histogram: &Histogram) -> f64 {
    let count = histogram.get_sample_count();
    if count == 0 {
        return 0.0;
    }
    histogram.get_sample_sum() / count as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_vec_increment() {
        let counter = SEARCH_REQUESTS.with_label_values(&["keyword"]);
        let initial = counter.get();
        counter.inc();
        assert!((counter.get() - initial - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_register_twice_is_harmless() {
        register_metrics();
        register_metrics();
        SEARCH_DEGRADED.inc();
        let output = gather_metrics();
        assert!(output.contains("examsearch_search_degraded_total"));
    }

    #[test]
    fn test_histogram_avg_empty() {
        let h = Histogram::with_opts(HistogramOpts::new("t_empty", "t")).unwrap();
        assert_eq!(calculate_histogram_avg(&h), 0.0);
        h.observe(2.0);
        h.observe(4.0);
        assert!((calculate_histogram_avg(&h) - 3.0).abs() < f64::EPSILON);
    }
}
