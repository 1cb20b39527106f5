//! Metrics module for rating-service.
//! Provides Prometheus metrics for collection, rating and store operations.

use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Database query duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "rating_db_query_duration_seconds",
            "Database query duration"
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Collection cycle counter by result
pub static COLLECTION_CYCLES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Usage entries committed, per tenant
pub static USAGE_ENTRIES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Rate lookups by source and outcome
pub static RATE_LOOKUPS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Error counter for alerting
pub static ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Call once at startup.
pub fn init_metrics() {
    COLLECTION_CYCLES_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "rating_collection_cycles_total",
                "Total collection cycles by result"
            ),
            &["result"]
        )
        .expect("Failed to register COLLECTION_CYCLES_TOTAL")
    });

    USAGE_ENTRIES_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "rating_usage_entries_total",
                "Total usage entries committed by tenant"
            ),
            &["tenant_id"]
        )
        .expect("Failed to register USAGE_ENTRIES_TOTAL")
    });

    RATE_LOOKUPS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "rating_rate_lookups_total",
                "Total rate lookups by source and outcome"
            ),
            &["source", "result"]
        )
        .expect("Failed to register RATE_LOOKUPS_TOTAL")
    });

    ERRORS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("rating_errors_total", "Total errors by component"),
            &["component"]
        )
        .expect("Failed to register ERRORS_TOTAL")
    });
}

/// Render all registered metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

pub fn record_collection_cycle(result: &str) {
    if let Some(counter) = COLLECTION_CYCLES_TOTAL.get() {
        counter.with_label_values(&[result]).inc();
    }
}

pub fn record_usage_entries(tenant_id: &str, count: u64) {
    if let Some(counter) = USAGE_ENTRIES_TOTAL.get() {
        counter.with_label_values(&[tenant_id]).inc_by(count);
    }
}

pub fn record_rate_lookup(source: &str, result: &str) {
    if let Some(counter) = RATE_LOOKUPS_TOTAL.get() {
        counter.with_label_values(&[source, result]).inc();
    }
}

pub fn record_error(component: &str) {
    if let Some(counter) = ERRORS_TOTAL.get() {
        counter.with_label_values(&[component]).inc();
    }
}
