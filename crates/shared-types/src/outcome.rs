// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Lookup outcome types

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::Record;

/// Why a lookup did not produce a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Identifier failed format or checksum validation
    InvalidInput,
    /// Registry has no record for the identifier
    NotFound,
    /// Registry lists the identifier as suspended or cancelled
    Inactive,
    /// The source did not answer within its budget
    Timeout,
    /// Session was rejected by the portal
    Unauthenticated,
    /// Upstream answered with an error or unusable body
    UpstreamError,
    /// No fast-path channel was free
    Unavailable,
    /// Fast path and fallback both failed
    AllMethodsExhausted,
}

impl FailureReason {
    /// Stable machine-readable code
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::NotFound => "not_found",
            Self::Inactive => "inactive",
            Self::Timeout => "timeout",
            Self::Unauthenticated => "unauthenticated",
            Self::UpstreamError => "upstream_error",
            Self::Unavailable => "unavailable",
            Self::AllMethodsExhausted => "all_methods_exhausted",
        }
    }

    /// Ordinary negative answers, as opposed to faults
    pub const fn is_negative_result(self) -> bool {
        matches!(self, Self::InvalidInput | Self::NotFound | Self::Inactive)
    }

    /// Get a default message for this reason
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::InvalidInput => "identifier is not a valid national id or tax registry number",
            Self::NotFound => "no record found for the identifier",
            Self::Inactive => "taxpayer is suspended or cancelled",
            Self::Timeout => "registry did not answer in time",
            Self::Unauthenticated => "portal session is no longer valid",
            Self::UpstreamError => "registry returned an unexpected response",
            Self::Unavailable => "no portal session is available",
            Self::AllMethodsExhausted => "portal session and public registries both failed",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Result of resolving one identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LookupOutcome {
    /// Record was resolved by one of the sources
    Success {
        /// The resolved record
        record: Record,
    },
    /// Lookup ended without a record
    Failure {
        /// Identifier as submitted
        identifier: String,
        /// Classified reason
        reason: FailureReason,
        /// Human-readable detail
        message: String,
        /// Milliseconds spent on the lookup
        elapsed_ms: u64,
    },
}

impl LookupOutcome {
    /// Whether a record was produced
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The record, if any
    pub const fn record(&self) -> Option<&Record> {
        match self {
            Self::Success { record } => Some(record),
            Self::Failure { .. } => None,
        }
    }

    /// The failure reason, if any
    pub const fn reason(&self) -> Option<FailureReason> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { reason, .. } => Some(*reason),
        }
    }
}
