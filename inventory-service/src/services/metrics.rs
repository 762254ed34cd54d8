//! Prometheus metrics for inventory-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "inventory_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register db_query_duration")
});

/// Goods receipt counter by outcome.
pub static GOODS_RECEIPTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "inventory_goods_receipts_total",
        "Total number of goods receipt batches by outcome",
        &["outcome"] // applied, rejected
    )
    .expect("Failed to register goods_receipts_total")
});

/// Ledger entry counter by movement type.
pub static STOCK_MOVEMENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "inventory_stock_movements_total",
        "Total number of stock movements appended to the ledger",
        &["movement_type"] // entry, exit, adjustment
    )
    .expect("Failed to register stock_movements_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "inventory_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Map an application error to its counter label.
pub fn error_label(err: &service_core::error::AppError) -> &'static str {
    use service_core::error::AppError;
    match err {
        AppError::ValidationError(_) => "validation",
        AppError::BadRequest(_) => "bad_request",
        AppError::NotFound(_) => "not_found",
        AppError::Unauthorized(_) => "unauthorized",
        AppError::Conflict(_) => "conflict",
        AppError::DatabaseError(_) => "database",
        AppError::ServiceUnavailable => "unavailable",
        AppError::InternalError(_) | AppError::ConfigError(_) => "internal",
    }
}

/// Force registration of all metrics so they appear in `/metrics` output
/// before first use.
pub fn init() {
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&GOODS_RECEIPTS_TOTAL);
    Lazy::force(&STOCK_MOVEMENTS_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
}

/// Render all registered metrics in the Prometheus text format.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
