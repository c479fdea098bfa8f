// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! `OpenAPI` document definition

use portal_client::HealthStatus;
use registry_lookup::{BatchReport, BatchSummary, PoolStatus};
use shared_types::{FailureReason, IdentityKind, LookupOutcome, Record, TaxpayerDetails};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::{
    config::Environment,
    error::ErrorBody,
    routes::handlers::{
        self, BatchLookupRequest, LookupRequest, RefreshResponse, ValidationResponse,
    },
    state::HealthCheck,
};

/// API documentation root
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Registry Lookup API",
        description = "Resolves national identity and tax registry numbers through pooled portal sessions with a public-registry fallback."
    ),
    paths(
        handlers::health_handler,
        handlers::lookup_handler,
        handlers::batch_lookup_handler,
        handlers::validate_handler,
        handlers::pool_status_handler,
        handlers::pool_refresh_handler,
        handlers::pool_close_handler,
    ),
    components(schemas(
        LookupRequest,
        BatchLookupRequest,
        ValidationResponse,
        RefreshResponse,
        Record,
        TaxpayerDetails,
        IdentityKind,
        LookupOutcome,
        FailureReason,
        BatchReport,
        BatchSummary,
        PoolStatus,
        HealthCheck,
        HealthStatus,
        Environment,
        ErrorBody,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Service health"),
        (name = "lookup", description = "Identifier lookup and validation"),
        (name = "admin", description = "Session pool administration")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/health",
            "/v1/lookup",
            "/v1/lookup/batch",
            "/v1/validate",
            "/v1/pool/status",
            "/v1/pool/refresh",
            "/v1/pool/close",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{path} missing");
        }
    }

    #[test]
    fn bearer_scheme_is_registered() {
        let doc = ApiDoc::openapi();
        let components = doc.components.unwrap();
        assert!(components.security_schemes.contains_key("bearer"));
        assert!(components.schemas.contains_key("Record"));
    }
}
