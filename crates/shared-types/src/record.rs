// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Registry record types
//!
//! A [`Record`] is the normalised answer every source produces, whichever path
//! resolved it. It always has a legal name; fields a source does not provide are
//! empty strings rather than missing.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use utoipa::ToSchema;

use crate::IdentityNumber;

/// Public source used by the slow path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FallbackSource {
    /// Public civil-registry mirror, short-form numbers
    CivilRegistry,
    /// Public tax-registry API, long-form numbers
    TaxRegistry,
}

impl FallbackSource {
    /// Tag suffix used in [`SourceMethod`]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CivilRegistry => "civil_registry",
            Self::TaxRegistry => "tax_registry",
        }
    }
}

/// Which path produced a record
///
/// Serialised as `fast` or `fallback:<source>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceMethod {
    /// Authenticated portal session
    Fast,
    /// Public slow-path source
    Fallback(FallbackSource),
}

impl SourceMethod {
    /// Whether the record came from the fast path
    pub const fn is_fast(self) -> bool {
        matches!(self, Self::Fast)
    }

    /// Short label for metrics: `fast` or `fallback`
    pub const fn path(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Fallback(_) => "fallback",
        }
    }
}

impl fmt::Display for SourceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fast => f.write_str("fast"),
            Self::Fallback(source) => write!(f, "fallback:{}", source.as_str()),
        }
    }
}

/// Error parsing a [`SourceMethod`] tag
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown source method: {0}")]
pub struct ParseSourceMethodError(String);

impl FromStr for SourceMethod {
    type Err = ParseSourceMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fast" => Ok(Self::Fast),
            "fallback:civil_registry" => Ok(Self::Fallback(FallbackSource::CivilRegistry)),
            "fallback:tax_registry" => Ok(Self::Fallback(FallbackSource::TaxRegistry)),
            other => Err(ParseSourceMethodError(other.to_owned())),
        }
    }
}

impl Serialize for SourceMethod {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SourceMethod {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Extra taxpayer information published by the tax registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TaxpayerDetails {
    /// Main economic activity
    pub economic_activity: String,
    /// Taxpayer type, e.g. natural person or company
    pub taxpayer_type: String,
    /// Tax regime
    pub regime: String,
    /// Whether the taxpayer must keep formal accounts
    pub keeps_accounting: bool,
    /// Whether the taxpayer is a withholding agent
    pub withholding_agent: bool,
}

/// Normalised registry record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Record {
    /// Identifier the record was resolved for
    #[schema(value_type = String, example = "1710034065")]
    pub identifier: IdentityNumber,
    /// Legal name, never empty
    pub legal_name: String,
    /// Registered address
    pub address: String,
    /// Phone number
    pub phone: String,
    /// Email address
    pub email: String,
    /// Identification type as reported by the source
    pub identification_type: String,
    /// Path that produced the record
    #[schema(value_type = String, example = "fast")]
    pub method: SourceMethod,
    /// Milliseconds from lookup start to resolution
    pub elapsed_ms: u64,
    /// Tax-registry details, long-form lookups only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<TaxpayerDetails>,
}

impl Record {
    /// Create a record with the mandatory fields; the rest start empty
    pub fn new(identifier: IdentityNumber, legal_name: impl Into<String>, method: SourceMethod) -> Self {
        let identification_type = identifier.kind().label().to_owned();
        Self {
            identifier,
            legal_name: legal_name.into(),
            address: String::new(),
            phone: String::new(),
            email: String::new(),
            identification_type,
            method,
            elapsed_ms: 0,
            details: None,
        }
    }

    /// Set the address
    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Set the phone number
    #[must_use]
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = phone.into();
        self
    }

    /// Set the email address
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    /// Override the identification type; blank values keep the default
    #[must_use]
    pub fn with_identification_type(mut self, identification_type: impl Into<String>) -> Self {
        let identification_type = identification_type.into();
        if !identification_type.trim().is_empty() {
            self.identification_type = identification_type;
        }
        self
    }

    /// Attach taxpayer details
    #[must_use]
    pub fn with_details(mut self, details: TaxpayerDetails) -> Self {
        self.details = Some(details);
        self
    }

    /// Stamp the elapsed time
    #[must_use]
    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_method_tags() {
        assert_eq!(SourceMethod::Fast.to_string(), "fast");
        assert_eq!(
            SourceMethod::Fallback(FallbackSource::CivilRegistry).to_string(),
            "fallback:civil_registry"
        );
        assert_eq!(
            "fallback:tax_registry".parse::<SourceMethod>().unwrap(),
            SourceMethod::Fallback(FallbackSource::TaxRegistry)
        );
        assert!("fallback:unknown".parse::<SourceMethod>().is_err());
        assert_eq!(SourceMethod::Fallback(FallbackSource::TaxRegistry).path(), "fallback");
    }

    #[test]
    fn record_defaults_identification_type_from_kind() {
        let short = Record::new(
            IdentityNumber::parse("1710034065").unwrap(),
            "JUAN PEREZ",
            SourceMethod::Fast,
        );
        assert_eq!(short.identification_type, "national_id");
        assert!(short.address.is_empty());

        let long = Record::new(
            IdentityNumber::parse("1726386236001").unwrap(),
            "ACME S.A.",
            SourceMethod::Fallback(FallbackSource::TaxRegistry),
        )
        .with_identification_type("  ");
        assert_eq!(long.identification_type, "tax_registry");
    }

    #[test]
    fn record_serializes_method_as_tag() {
        let record = Record::new(
            IdentityNumber::parse("1726386236").unwrap(),
            "MARIA LOPEZ",
            SourceMethod::Fallback(FallbackSource::CivilRegistry),
        )
        .with_address("AV. AMAZONAS")
        .with_elapsed_ms(42);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["identifier"], "1726386236");
        assert_eq!(json["method"], "fallback:civil_registry");
        assert_eq!(json["elapsed_ms"], 42);
        assert!(json.get("details").is_none());

        let back: Record = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
