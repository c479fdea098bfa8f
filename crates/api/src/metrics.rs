// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Prometheus metrics module
//!
//! Provides global metrics using the default Prometheus registry via macros and
//! an Axum-compatible metrics handler.

use std::sync::LazyLock;

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGaugeVec, TextEncoder, register_histogram_vec,
    register_int_counter_vec, register_int_gauge_vec,
};
use registry_lookup::PoolStatus;
use shared_types::LookupOutcome;

use crate::error::ServerError;

/// Lookups served, labeled by resolving method and result code
pub static LOOKUP_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "lookup_requests_total",
        "Total number of identifier lookups, labeled by method and result",
        &["method", "result"]
    )
    .expect("Failed to create lookup_requests_total counter vec")
});

/// Histogram of single lookup durations in seconds
pub static LOOKUP_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "lookup_duration_seconds",
        "Identifier lookup durations in seconds",
        &["method"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 3.0, 5.0, 10.0]
    )
    .expect("Failed to create lookup duration histogram")
});

/// Histogram of batch durations in seconds
pub static LOOKUP_BATCH_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "lookup_batch_duration_seconds",
        "Batch lookup durations in seconds",
        &["batch_size_category"],
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    )
    .expect("Failed to create batch lookup duration histogram")
});

/// Portal channels by state, refreshed whenever the pool is inspected
pub static POOL_CHANNELS: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    register_int_gauge_vec!(
        "lookup_pool_channels",
        "Portal channels in the session pool, labeled by state",
        &["state"]
    )
    .expect("Failed to create pool channels gauge vec")
});

/// Method label when no source produced a record
pub const NO_METHOD: &str = "none";

/// Result label of a resolved lookup; failures use their reason code
pub const SUCCESS: &str = "success";

/// Record one finished lookup
pub fn observe_lookup(method: &str, result: &str, duration_secs: f64) {
    LOOKUP_REQUESTS.with_label_values(&[method, result]).inc();
    LOOKUP_DURATION
        .with_label_values(&[method])
        .observe(duration_secs);
}

/// Record one finished lookup from its outcome
pub fn observe_outcome(outcome: &LookupOutcome, duration_secs: f64) {
    match outcome {
        LookupOutcome::Success { record } => {
            observe_lookup(record.method.path(), SUCCESS, duration_secs);
        }
        LookupOutcome::Failure { reason, .. } => {
            observe_lookup(NO_METHOD, reason.code(), duration_secs);
        }
    }
}

/// Bucket name for a batch size
pub fn batch_size_category(size: usize) -> &'static str {
    match size {
        0..=1 => "single",
        2..=10 => "small",
        11..=25 => "medium",
        _ => "large",
    }
}

/// Observe the duration of a whole batch
pub fn observe_batch_duration(size: usize, duration_secs: f64) {
    LOOKUP_BATCH_DURATION
        .with_label_values(&[batch_size_category(size)])
        .observe(duration_secs);
}

/// Publish a pool snapshot
pub fn update_pool_gauges(status: &PoolStatus) {
    let gauges = [
        ("ready", status.ready),
        ("busy", status.busy),
        ("failed", status.failed),
        ("total", status.total),
    ];
    for (state, count) in gauges {
        POOL_CHANNELS
            .with_label_values(&[state])
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }
}

/// Axum handler that exports metrics in Prometheus text format
pub async fn metrics_handler() -> Result<Response, ServerError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ServerError::Runtime {
            message: format!("failed to encode metrics: {e}"),
        })?;

    let body = String::from_utf8(buffer).map_err(|e| ServerError::Runtime {
        message: format!("metrics buffer is not valid UTF-8: {e}"),
    })?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        body,
    )
        .into_response())
}
