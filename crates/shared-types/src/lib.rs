// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Shared types for the registry lookup service
//!
//! This crate provides the identity number, record and outcome types that are
//! shared across the lookup and server crates, avoiding circular dependencies.

pub mod identity;
pub mod outcome;
pub mod record;

pub use identity::{IdentityError, IdentityKind, IdentityNumber, validate_short_form};
pub use outcome::{FailureReason, LookupOutcome};
pub use record::{FallbackSource, ParseSourceMethodError, Record, SourceMethod, TaxpayerDetails};
