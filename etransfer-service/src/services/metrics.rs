//! Prometheus metrics for etransfer-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

/// Histogram for database query duration by operation.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "etransfer_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Counter for match outcomes by disposition.
pub static MATCH_OUTCOMES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "etransfer_match_outcomes_total",
        "Total number of processed transfer notifications",
        &["outcome"]
    )
    .expect("Failed to register MATCH_OUTCOMES")
});

/// Counter for errors.
pub static ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "etransfer_errors_total",
        "Total number of errors",
        &["error_type"]
    )
    .expect("Failed to register ERRORS")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&MATCH_OUTCOMES);
    Lazy::force(&ERRORS);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Record a match outcome (auto_applied, pending_review, duplicate).
pub fn record_match_outcome(outcome: &str) {
    MATCH_OUTCOMES.with_label_values(&[outcome]).inc();
}

/// Record an error.
pub fn record_error(error_type: &str) {
    ERRORS.with_label_values(&[error_type]).inc();
}
