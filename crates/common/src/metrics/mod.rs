//! Metrics and observability utilities
//!
//! Prometheus-style metrics behind the `metrics` facade. Binaries decide
//! whether an exporter is installed; without one every helper is a no-op.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

/// Metrics prefix for all Lorehunt metrics
pub const METRICS_PREFIX: &str = "lorehunt";

/// Histogram buckets for search and gate latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, // 5ms
    0.010, // 10ms
    0.025, // 25ms
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
    10.00, // 10s
];

/// Buckets for embedding batches and whole ingestion runs (much slower)
pub const EMBEDDING_BUCKETS: &[f64] = &[
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.000, // 2s
    5.000, // 5s
    10.00, // 10s
    30.00, // 30s
    60.00, // 1m
    300.0, // 5m
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Embedding metrics
    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding batch requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding batch latency in seconds"
    );

    describe_counter!(
        format!("{}_embedding_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total failed embedding batches"
    );

    // Vector index metrics
    describe_counter!(
        format!("{}_rows_inserted_total", METRICS_PREFIX),
        Unit::Count,
        "Rows inserted into vector collections"
    );

    describe_counter!(
        format!("{}_retries_total", METRICS_PREFIX),
        Unit::Count,
        "Retried batch operations"
    );

    // Ingestion metrics
    describe_counter!(
        format!("{}_ingestion_runs_total", METRICS_PREFIX),
        Unit::Count,
        "Ingestion runs by outcome"
    );

    describe_counter!(
        format!("{}_chunks_created_total", METRICS_PREFIX),
        Unit::Count,
        "Total chunks created"
    );

    describe_histogram!(
        format!("{}_ingestion_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Ingestion run duration in seconds"
    );

    // Retrieval metrics
    describe_counter!(
        format!("{}_retrieval_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total retrieval queries"
    );

    describe_histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Retrieval latency in seconds"
    );

    describe_gauge!(
        format!("{}_retrieval_results_count", METRICS_PREFIX),
        Unit::Count,
        "Passages returned by the last retrieval"
    );

    // Gate metrics
    describe_counter!(
        format!("{}_gate_verdicts_total", METRICS_PREFIX),
        Unit::Count,
        "Similarity gate verdicts by outcome"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
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

    tracing::trace!(model = model, batch_size = batch_size, success = success, "Embedding batch recorded");
}

/// Helper to record rows committed to a collection
pub fn record_insert(collection: &str, rows: usize) {
    counter!(
        format!("{}_rows_inserted_total", METRICS_PREFIX),
        "collection" => collection.to_string()
    )
    .increment(rows as u64);
}

/// Helper to record a retried operation
pub fn record_retry(operation: &str) {
    counter!(
        format!("{}_retries_total", METRICS_PREFIX),
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Helper to record ingestion metrics
pub fn record_ingestion(duration_secs: f64, chunks_created: usize, success: bool) {
    let status = if success { "success" } else { "aborted" };

    counter!(
        format!("{}_ingestion_runs_total", METRICS_PREFIX),
        "status" => status
    )
    .increment(1);

    counter!(format!("{}_chunks_created_total", METRICS_PREFIX)).increment(chunks_created as u64);

    histogram!(format!("{}_ingestion_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Helper to record retrieval metrics
pub fn record_retrieval(duration_secs: f64, mode: &str, result_count: usize) {
    counter!(
        format!("{}_retrieval_queries_total", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .record(duration_secs);

    gauge!(
        format!("{}_retrieval_results_count", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .set(result_count as f64);
}

/// Helper to record a similarity gate outcome
pub fn record_gate(outcome: &str) {
    counter!(
        format!("{}_gate_verdicts_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}
