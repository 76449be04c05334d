//! Prometheus metrics for stamping-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Stamp request counter by outcome.
pub static STAMP_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "stamping_stamp_requests_total",
        "Total number of stamp requests by outcome",
        &["outcome"] // stamped, rejected, unconfirmed, duplicate, validation_failed
    )
    .expect("Failed to register stamp_requests_total")
});

/// Cancellation request counter by outcome.
pub static CANCEL_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "stamping_cancel_requests_total",
        "Total number of cancellation requests by outcome",
        &["outcome"] // cancelled, pending, rejected
    )
    .expect("Failed to register cancel_requests_total")
});

/// Authority call duration histogram by operation.
pub static AUTHORITY_CALL_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "stamping_authority_call_duration_seconds",
        "Authority call duration in seconds",
        &["operation"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("Failed to register authority_call_duration")
});

/// Reconciliation poll counter by result.
pub static RECONCILIATION_POLLS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "stamping_reconciliation_polls_total",
        "Total number of reconciliation status polls by result",
        &["result"] // found, not_found, unavailable
    )
    .expect("Failed to register reconciliation_polls_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "stamping_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "stamping_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&STAMP_REQUESTS_TOTAL);
    Lazy::force(&CANCEL_REQUESTS_TOTAL);
    Lazy::force(&AUTHORITY_CALL_DURATION);
    Lazy::force(&RECONCILIATION_POLLS_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
