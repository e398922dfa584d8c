//! Prometheus metrics for invoice-sync-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Generation attempts by document type, request kind and outcome.
pub static DOCUMENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "invoice_sync_documents_total",
        "Document generation attempts by type, request and outcome",
        &["document_type", "request", "outcome"]
    )
    .expect("Failed to register documents_total")
});

/// Remote API call duration by operation.
pub static API_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "invoice_sync_api_request_duration_seconds",
        "Remote API request duration in seconds",
        &["operation"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("Failed to register api_request_duration")
});

/// Remote API calls by operation and outcome.
pub static API_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "invoice_sync_api_requests_total",
        "Remote API requests by operation and outcome",
        &["operation", "outcome"]
    )
    .expect("Failed to register api_requests_total")
});

/// Scheduled deferred jobs by kind.
pub static JOBS_SCHEDULED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "invoice_sync_jobs_scheduled_total",
        "Deferred jobs scheduled by kind",
        &["kind"]
    )
    .expect("Failed to register jobs_scheduled_total")
});

/// Executed deferred jobs by kind and outcome.
pub static JOBS_EXECUTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "invoice_sync_jobs_executed_total",
        "Deferred jobs executed by kind and outcome",
        &["kind", "outcome"]
    )
    .expect("Failed to register jobs_executed_total")
});

/// Operator notices raised.
pub static NOTICES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "invoice_sync_notices_total",
        "Admin notices raised by level",
        &["level"]
    )
    .expect("Failed to register notices_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "invoice_sync_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "invoice_sync_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&DOCUMENTS_TOTAL);
    Lazy::force(&API_REQUEST_DURATION);
    Lazy::force(&API_REQUESTS_TOTAL);
    Lazy::force(&JOBS_SCHEDULED_TOTAL);
    Lazy::force(&JOBS_EXECUTED_TOTAL);
    Lazy::force(&NOTICES_TOTAL);
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
