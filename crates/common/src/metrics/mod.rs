//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with standardized naming conventions
//! for the search pipeline and its stage caches.

use crate::errors::Stage;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

/// Metrics prefix for all ShopSage metrics
pub const METRICS_PREFIX: &str = "shopsage";

/// Histogram buckets for search latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001,  // 1ms (warm cache)
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s (cold rerank)
    5.000,  // 5s
    10.00,  // 10s
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_search_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of search queries"
    );

    describe_histogram!(
        format!("{}_search_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end search latency in seconds"
    );

    describe_gauge!(
        format!("{}_search_results_count", METRICS_PREFIX),
        Unit::Count,
        "Number of results returned from search"
    );

    describe_histogram!(
        format!("{}_stage_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Per-stage pipeline latency in seconds"
    );

    describe_counter!(
        format!("{}_cache_hits_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache hits"
    );

    describe_counter!(
        format!("{}_cache_misses_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache misses"
    );

    describe_counter!(
        format!("{}_cache_evictions_total", METRICS_PREFIX),
        Unit::Count,
        "Entries evicted from stage caches"
    );

    describe_counter!(
        format!("{}_mapping_gaps_total", METRICS_PREFIX),
        Unit::Count,
        "Fused candidates dropped for lacking a record"
    );

    describe_counter!(
        format!("{}_rerank_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Relevance model failures"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record search metrics
pub fn record_search(duration_secs: f64, reranked: bool, result_count: usize) {
    let mode = if reranked { "reranked" } else { "fused" };

    counter!(
        format!("{}_search_queries_total", METRICS_PREFIX),
        "mode" => mode
    )
    .increment(1);

    histogram!(
        format!("{}_search_duration_seconds", METRICS_PREFIX),
        "mode" => mode
    )
    .record(duration_secs);

    gauge!(
        format!("{}_search_results_count", METRICS_PREFIX),
        "mode" => mode
    )
    .set(result_count as f64);
}

/// Helper to record one stage's latency
pub fn record_stage(stage: Stage, duration_secs: f64) {
    histogram!(
        format!("{}_stage_duration_seconds", METRICS_PREFIX),
        "stage" => stage.as_str()
    )
    .record(duration_secs);
}

/// Helper to record cache metrics
pub fn record_cache(hit: bool, cache_name: &'static str) {
    if hit {
        counter!(
            format!("{}_cache_hits_total", METRICS_PREFIX),
            "cache" => cache_name
        )
        .increment(1);
    } else {
        counter!(
            format!("{}_cache_misses_total", METRICS_PREFIX),
            "cache" => cache_name
        )
        .increment(1);
    }
}

pub fn record_eviction(cache_name: &'static str) {
    counter!(
        format!("{}_cache_evictions_total", METRICS_PREFIX),
        "cache" => cache_name
    )
    .increment(1);
}

pub fn record_mapping_gaps(count: usize) {
    counter!(format!("{}_mapping_gaps_total", METRICS_PREFIX)).increment(count as u64);
}

pub fn record_rerank_failure() {
    counter!(format!("{}_rerank_failures_total", METRICS_PREFIX)).increment(1);
}
