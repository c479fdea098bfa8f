// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Error handling module
//!
//! This module provides the server error type and its HTTP response mapping.
//! Every error body has the shape `{ "error": <code>, "message": ..., "status": ... }`.

use std::net::SocketAddr;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use registry_lookup::LookupError;
use serde::Serialize;
use shared_types::FailureReason;
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

/// Comprehensive error types for server operations
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration validation errors
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Network binding errors
    #[error("Failed to bind to {address}: {source}")]
    Bind {
        /// Socket address that failed to bind
        address: SocketAddr,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Server startup errors
    #[error("Server startup failed: {source}")]
    Startup {
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Server shutdown errors
    #[error("Server shutdown failed: {source}")]
    Shutdown {
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Runtime errors during server operation
    #[error("Runtime error: {message}")]
    Runtime {
        /// Error message
        message: String,
    },

    /// Dependency construction errors
    #[error("Dependency error: {message}")]
    Dependency {
        /// Error message
        message: String,
    },

    /// Input validation errors
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// JSON parsing errors with detailed context
    #[error("Invalid JSON request: {message}")]
    JsonError {
        /// Detailed error message
        message: String,
    },

    /// Missing or wrong admin bearer token
    #[error("Missing or invalid admin token")]
    Unauthorized,

    /// Admin endpoints are disabled because no token is configured
    #[error("Administrative endpoints are disabled")]
    AdminDisabled,

    /// Client exceeded its request budget
    #[error("Rate limit exceeded, retry later")]
    RateLimited,

    /// Lookup ended without a record
    #[error(transparent)]
    Lookup(#[from] LookupError),
}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

/// JSON error body returned by every endpoint
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Stable machine-readable code
    #[schema(example = "not_found")]
    pub error: String,
    /// Human-readable description
    pub message: String,
    /// HTTP status code
    #[schema(example = 404)]
    pub status: u16,
}

/// HTTP status for a lookup failure reason
pub fn status_for_reason(reason: FailureReason) -> StatusCode {
    match reason {
        FailureReason::InvalidInput => StatusCode::BAD_REQUEST,
        FailureReason::NotFound | FailureReason::Inactive => StatusCode::NOT_FOUND,
        FailureReason::Timeout => StatusCode::GATEWAY_TIMEOUT,
        FailureReason::UpstreamError | FailureReason::AllMethodsExhausted => {
            StatusCode::BAD_GATEWAY
        }
        FailureReason::Unauthenticated | FailureReason::Unavailable => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

impl ServerError {
    /// Status code and machine-readable code for this error
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ServerError::Config { .. }
            | ServerError::Bind { .. }
            | ServerError::Startup { .. }
            | ServerError::Shutdown { .. }
            | ServerError::Runtime { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            ServerError::Dependency { .. } => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
            ServerError::ValidationError(..) => (StatusCode::BAD_REQUEST, "invalid_input"),
            ServerError::JsonError { .. } => (StatusCode::BAD_REQUEST, "invalid_json"),
            ServerError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ServerError::AdminDisabled => (StatusCode::FORBIDDEN, "admin_disabled"),
            ServerError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            ServerError::Lookup(lookup) => {
                let reason = lookup.reason();
                (status_for_reason(reason), reason.code())
            }
        }
    }

    /// Client-facing message; upstream details stay in the logs
    fn public_message(&self) -> String {
        match self {
            ServerError::Lookup(
                lookup @ (LookupError::Upstream(_) | LookupError::AllMethodsExhausted { .. }),
            ) => lookup.reason().default_message().to_string(),
            ServerError::Config { .. }
            | ServerError::Bind { .. }
            | ServerError::Startup { .. }
            | ServerError::Shutdown { .. }
            | ServerError::Runtime { .. } => "internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if status.is_server_error() && !matches!(self, ServerError::Lookup(_)) {
            error!(error = %self, "request failed with an internal error");
        }

        let body = ErrorBody {
            error: code.to_string(),
            message: self.public_message(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use registry_lookup::{FallbackError, QueryError};
    use shared_types::IdentityError;

    use super::*;

    #[test]
    fn lookup_errors_map_to_http_statuses() {
        let cases = [
            (
                ServerError::Lookup(LookupError::InvalidInput(IdentityError::InvalidCheckDigit)),
                StatusCode::BAD_REQUEST,
                "invalid_input",
            ),
            (
                ServerError::Lookup(LookupError::NotFound),
                StatusCode::NOT_FOUND,
                "not_found",
            ),
            (
                ServerError::Lookup(LookupError::Inactive("suspended".to_string())),
                StatusCode::NOT_FOUND,
                "inactive",
            ),
            (
                ServerError::Lookup(LookupError::Timeout { timeout_ms: 3000 }),
                StatusCode::GATEWAY_TIMEOUT,
                "timeout",
            ),
            (
                ServerError::Lookup(LookupError::Upstream(FallbackError::Upstream {
                    status: 503,
                    message: "maintenance".to_string(),
                })),
                StatusCode::BAD_GATEWAY,
                "upstream_error",
            ),
            (
                ServerError::Lookup(LookupError::AllMethodsExhausted {
                    fast: QueryError::NotFound,
                    fallback: FallbackError::Upstream {
                        status: 500,
                        message: String::new(),
                    },
                }),
                StatusCode::BAD_GATEWAY,
                "all_methods_exhausted",
            ),
            (
                ServerError::Lookup(LookupError::EmptyBatch),
                StatusCode::BAD_REQUEST,
                "invalid_input",
            ),
        ];

        for (error, status, code) in cases {
            assert_eq!(error.status_and_code(), (status, code), "{error}");
        }
    }

    #[test]
    fn server_errors_map_to_http_statuses() {
        assert_eq!(
            ServerError::Unauthorized.status_and_code().0,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServerError::AdminDisabled.status_and_code().0,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ServerError::RateLimited.status_and_code().0,
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ServerError::Runtime {
                message: "boom".to_string()
            }
            .status_and_code()
            .0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn exhausted_message_hides_upstream_details() {
        let error = ServerError::Lookup(LookupError::AllMethodsExhausted {
            fast: QueryError::Upstream {
                status: 500,
                message: "stack trace from portal".to_string(),
            },
            fallback: FallbackError::NotFound,
        });
        let message = error.public_message();
        assert!(!message.contains("stack trace"));
        assert_eq!(
            message,
            FailureReason::AllMethodsExhausted.default_message()
        );
    }

    #[test]
    fn internal_errors_are_not_echoed() {
        let error = ServerError::Runtime {
            message: "secret detail".to_string(),
        };
        assert_eq!(error.public_message(), "internal server error");
    }
}
