// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! HTTP request handlers module
//!
//! Health, lookup, validation and pool administration handlers. Lookup handlers
//! map failures onto `ServerError`; batch entries never fail the whole request.

use std::time::Instant;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use registry_lookup::{BatchReport, PoolStatus};
use serde::{Deserialize, Serialize};
use shared_types::{IdentityKind, IdentityNumber, LookupOutcome, Record};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::{
    error::{ErrorBody, ServerError},
    extractors::JsonExtractor,
    metrics,
    state::{HealthCheck, ServerState},
};

/// Health check endpoint handler
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    summary = "Health check endpoint",
    description = "Reports `Up` while at least one portal session is ready, `Degraded` while lookups are served only by the public registries, and `Down` once the session pool was closed.",
    responses(
        (status = 200, description = "Service is up or degraded", body = HealthCheck),
        (status = 503, description = "Session pool closed", body = HealthCheck)
    )
)]
pub async fn health_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let health = state.health_check();
    let status = if health.status.is_down() {
        warn!(reason = health.status.description(), "health check reports service down");
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(health))
}

/// Single lookup request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LookupRequest {
    /// National id (10 digits) or tax registry number (13 digits)
    #[schema(example = "1710034065")]
    pub identifier: String,
}

/// Identifier lookup
///
/// Tries one pooled portal session when available, then the public registry.
#[utoipa::path(
    post,
    path = "/v1/lookup",
    tag = "lookup",
    summary = "Look up an identity or tax registry number",
    request_body = LookupRequest,
    responses(
        (status = 200, description = "Record found", body = Record),
        (status = 400, description = "Malformed identifier", body = ErrorBody),
        (status = 404, description = "No record, or the taxpayer is inactive", body = ErrorBody),
        (status = 502, description = "Registries answered with errors", body = ErrorBody),
        (status = 504, description = "Lookup deadline elapsed", body = ErrorBody)
    )
)]
pub async fn lookup_handler(
    State(state): State<ServerState>,
    JsonExtractor(request): JsonExtractor<LookupRequest>,
) -> Result<Json<Record>, ServerError> {
    let started = Instant::now();
    let result = state.lookup().lookup(&request.identifier).await;
    let elapsed = started.elapsed().as_secs_f64();

    match result {
        Ok(record) => {
            metrics::observe_lookup(record.method.path(), metrics::SUCCESS, elapsed);
            Ok(Json(record))
        }
        Err(error) => {
            metrics::observe_lookup(metrics::NO_METHOD, error.reason().code(), elapsed);
            Err(error.into())
        }
    }
}

/// Batch lookup request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchLookupRequest {
    /// Identifiers to resolve, at least one and at most the configured maximum
    #[schema(example = json!(["1710034065", "1726386236001"]))]
    pub identifiers: Vec<String>,
}

/// Batch identifier lookup
///
/// Each entry is resolved independently; results keep the input order.
#[utoipa::path(
    post,
    path = "/v1/lookup/batch",
    tag = "lookup",
    summary = "Look up several identifiers concurrently",
    request_body = BatchLookupRequest,
    responses(
        (status = 200, description = "Per-entry outcomes and summary", body = BatchReport),
        (status = 400, description = "Empty or oversized batch", body = ErrorBody)
    )
)]
pub async fn batch_lookup_handler(
    State(state): State<ServerState>,
    JsonExtractor(request): JsonExtractor<BatchLookupRequest>,
) -> Result<Json<BatchReport>, ServerError> {
    let started = Instant::now();
    let report = state.lookup().lookup_batch(&request.identifiers).await?;
    metrics::observe_batch_duration(report.summary.total, started.elapsed().as_secs_f64());

    for outcome in &report.results {
        let elapsed_ms = match outcome {
            LookupOutcome::Success { record } => record.elapsed_ms,
            LookupOutcome::Failure { elapsed_ms, .. } => *elapsed_ms,
        };
        #[allow(clippy::cast_precision_loss)]
        metrics::observe_outcome(outcome, elapsed_ms as f64 / 1000.0);
    }

    info!(
        total = report.summary.total,
        succeeded = report.summary.succeeded,
        fast_path = report.summary.fast_path,
        elapsed_ms = report.summary.elapsed_ms,
        "batch lookup finished"
    );
    Ok(Json(report))
}

/// Offline identifier check
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ValidationResponse {
    /// Identifier as submitted
    pub identifier: String,
    /// Whether it passed format and check-digit validation
    pub valid: bool,
    /// Detected form when valid
    pub kind: Option<IdentityKind>,
    /// Explanation
    pub message: String,
}

/// Identifier validation
///
/// Runs the format and check-digit rules only; no registry is contacted.
#[utoipa::path(
    post,
    path = "/v1/validate",
    tag = "lookup",
    summary = "Validate an identifier without looking it up",
    request_body = LookupRequest,
    responses(
        (status = 200, description = "Validation verdict", body = ValidationResponse),
        (status = 400, description = "Malformed request body", body = ErrorBody)
    )
)]
pub async fn validate_handler(
    JsonExtractor(request): JsonExtractor<LookupRequest>,
) -> Json<ValidationResponse> {
    let response = match IdentityNumber::parse(&request.identifier) {
        Ok(identifier) => ValidationResponse {
            valid: true,
            kind: Some(identifier.kind()),
            message: format!("valid {}", identifier.kind().label()),
            identifier: request.identifier,
        },
        Err(error) => ValidationResponse {
            valid: false,
            kind: None,
            message: error.to_string(),
            identifier: request.identifier,
        },
    };
    Json(response)
}

/// Session pool status
#[utoipa::path(
    get,
    path = "/v1/pool/status",
    tag = "admin",
    summary = "Inspect the portal session pool",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Pool snapshot", body = PoolStatus),
        (status = 401, description = "Missing or invalid admin token", body = ErrorBody),
        (status = 403, description = "Admin endpoints disabled", body = ErrorBody)
    )
)]
pub async fn pool_status_handler(State(state): State<ServerState>) -> Json<PoolStatus> {
    Json(state.pool_status())
}

/// Result of a pool refresh
#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    /// Channels that authenticated successfully
    pub ready: usize,
    /// Pool snapshot after the refresh
    pub pool: PoolStatus,
}

/// Rebuild the portal session pool
///
/// Closes every channel and authenticates a fresh set. In-flight lookups on
/// old channels finish; their channels are dropped on release.
#[utoipa::path(
    post,
    path = "/v1/pool/refresh",
    tag = "admin",
    summary = "Rebuild the portal session pool",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Pool rebuilt", body = RefreshResponse),
        (status = 401, description = "Missing or invalid admin token", body = ErrorBody),
        (status = 403, description = "Admin endpoints disabled", body = ErrorBody)
    )
)]
pub async fn pool_refresh_handler(State(state): State<ServerState>) -> Json<RefreshResponse> {
    let ready = state.lookup().pool().refresh().await;
    info!(ready, "session pool refreshed on request");
    Json(RefreshResponse {
        ready,
        pool: state.pool_status(),
    })
}

/// Close the portal session pool
///
/// Lookups keep working through the public registries afterwards.
#[utoipa::path(
    post,
    path = "/v1/pool/close",
    tag = "admin",
    summary = "Close every portal session",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Pool closed", body = PoolStatus),
        (status = 401, description = "Missing or invalid admin token", body = ErrorBody),
        (status = 403, description = "Admin endpoints disabled", body = ErrorBody)
    )
)]
pub async fn pool_close_handler(State(state): State<ServerState>) -> Json<PoolStatus> {
    state.lookup().pool().close_all().await;
    info!("session pool closed on request");
    Json(state.pool_status())
}
