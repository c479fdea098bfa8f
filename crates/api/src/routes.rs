// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Routes module
//!
//! This module provides route configuration for the lookup server.

pub mod handlers;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use handlers::{
    batch_lookup_handler, health_handler, lookup_handler, pool_close_handler,
    pool_refresh_handler, pool_status_handler, validate_handler,
};

use crate::{
    metrics::metrics_handler,
    middleware::{AdminAuth, RateLimiter, admin_auth_middleware, rate_limiting_middleware},
    openapi::{openapi_spec, swagger_ui},
    state::ServerState,
};

/// Create application routes
///
/// Health, metrics and documentation are never rate limited. Pool
/// administration sits behind the admin bearer token instead.
#[allow(clippy::needless_pass_by_value)]
pub fn create_routes(rate_limiter: RateLimiter, admin: AdminAuth) -> Router<ServerState> {
    let operational_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler));

    let docs_routes = Router::new()
        .route("/api-doc/openapi.json", get(openapi_spec))
        .route("/swagger-ui", get(swagger_ui));

    let mut lookup_routes = Router::new()
        .route("/lookup", post(lookup_handler))
        .route("/lookup/batch", post(batch_lookup_handler))
        .route("/validate", post(validate_handler));

    if rate_limiter.is_enabled() {
        lookup_routes = lookup_routes.layer(middleware::from_fn_with_state(
            rate_limiter.clone(),
            rate_limiting_middleware,
        ));
    }

    let admin_routes = Router::new()
        .route("/pool/status", get(pool_status_handler))
        .route("/pool/refresh", post(pool_refresh_handler))
        .route("/pool/close", post(pool_close_handler))
        .layer(middleware::from_fn_with_state(admin, admin_auth_middleware));

    let v1 = Router::new().nest("/v1", lookup_routes.merge(admin_routes));

    Router::new()
        .merge(operational_routes)
        .merge(docs_routes)
        .merge(v1)
}
