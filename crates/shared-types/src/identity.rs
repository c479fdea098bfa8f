// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Identity number types and validation
//!
//! This module provides the parsed [`IdentityNumber`] accepted by every lookup,
//! together with the check-digit validator for short-form (10 digit) numbers.
//! Long-form (13 digit) tax-registry numbers are only checked for digit count and
//! region code; their authoritative validity belongs to the public registry.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use utoipa::ToSchema;

/// Length of a short-form personal identity number
pub const SHORT_FORM_LEN: usize = 10;
/// Length of a long-form tax-registry number
pub const LONG_FORM_LEN: usize = 13;

const MIN_REGION_CODE: u8 = 1;
const MAX_REGION_CODE: u8 = 24;

/// Kind of identity number, determined by its length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    /// 10-digit personal identity number with a check digit
    Short,
    /// 13-digit entity or tax-registry number
    Long,
}

impl IdentityKind {
    /// Resolve the kind from a digit count
    pub const fn from_len(len: usize) -> Option<Self> {
        match len {
            SHORT_FORM_LEN => Some(Self::Short),
            LONG_FORM_LEN => Some(Self::Long),
            _ => None,
        }
    }

    /// Human-readable label used in records
    pub const fn label(self) -> &'static str {
        match self {
            Self::Short => "national_id",
            Self::Long => "tax_registry",
        }
    }
}

impl fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Reasons an identifier is rejected before any network access
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// Identifier was empty
    #[error("identifier is empty")]
    Empty,
    /// Identifier contains something other than ASCII digits
    #[error("identifier must contain digits only")]
    NonDigit,
    /// Identifier has an unsupported number of digits
    #[error("identifier must have 10 or 13 digits, got {0}")]
    InvalidLength(usize),
    /// Leading region code is outside the assigned range
    #[error("invalid region code {0:02}, expected 01-24")]
    InvalidRegion(u8),
    /// Short-form check digit does not match
    #[error("check digit does not match")]
    InvalidCheckDigit,
}

/// A parsed identity number
///
/// Construction goes through [`IdentityNumber::parse`], so a value of this type is
/// always digit-only, of a supported length, inside the region range and, for the
/// short form, carries a matching check digit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityNumber {
    digits: Box<str>,
    kind: IdentityKind,
}

impl IdentityNumber {
    /// Parse and validate an identifier
    ///
    /// # Errors
    ///
    /// Returns an [`IdentityError`] describing the first rule the input breaks.
    pub fn parse(input: &str) -> Result<Self, IdentityError> {
        let kind = check_format(input)?;
        if kind == IdentityKind::Short && !short_form_check_digit_matches(input) {
            return Err(IdentityError::InvalidCheckDigit);
        }
        Ok(Self {
            digits: Box::from(input),
            kind,
        })
    }

    /// The digits of the identifier
    pub fn as_str(&self) -> &str {
        &self.digits
    }

    /// Kind of identifier
    pub const fn kind(&self) -> IdentityKind {
        self.kind
    }

    /// Identifier with everything but the last four digits hidden, for logs
    pub fn masked(&self) -> String {
        let visible = &self.digits[self.digits.len() - 4..];
        format!("{}{visible}", "*".repeat(self.digits.len() - 4))
    }
}

/// Validate a short-form personal identity number
///
/// Returns `true` only for exactly ten digits whose region code lies in `01..=24`
/// and whose last digit equals the modulus-10 check digit of the first nine.
pub fn validate_short_form(input: &str) -> bool {
    input.len() == SHORT_FORM_LEN
        && matches!(check_format(input), Ok(IdentityKind::Short))
        && short_form_check_digit_matches(input)
}

/// Digit-only, length and region checks shared by both kinds
fn check_format(input: &str) -> Result<IdentityKind, IdentityError> {
    if input.is_empty() {
        return Err(IdentityError::Empty);
    }
    if !input.bytes().all(|b| b.is_ascii_digit()) {
        return Err(IdentityError::NonDigit);
    }
    let kind = IdentityKind::from_len(input.len())
        .ok_or(IdentityError::InvalidLength(input.len()))?;

    let bytes = input.as_bytes();
    let region = (bytes[0] - b'0') * 10 + (bytes[1] - b'0');
    if !(MIN_REGION_CODE..=MAX_REGION_CODE).contains(&region) {
        return Err(IdentityError::InvalidRegion(region));
    }
    Ok(kind)
}

/// Input must already be ten ASCII digits
fn short_form_check_digit_matches(input: &str) -> bool {
    let digits: Vec<u32> = input.bytes().map(|b| u32::from(b - b'0')).collect();
    let Some((&check, body)) = digits.split_last() else {
        return false;
    };

    let sum: u32 = body
        .iter()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 0 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();

    let next_ten = sum.div_ceil(10) * 10;
    next_ten - sum == check
}

impl fmt::Display for IdentityNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.digits)
    }
}

impl FromStr for IdentityNumber {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for IdentityNumber {
    fn as_ref(&self) -> &str {
        &self.digits
    }
}

impl Serialize for IdentityNumber {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.digits)
    }
}

impl<'de> Deserialize<'de> for IdentityNumber {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_valid_short_forms() {
        assert!(validate_short_form("1710034065"));
        assert!(validate_short_form("1726386236"));

        let id = IdentityNumber::parse("1710034065").unwrap();
        assert_eq!(id.kind(), IdentityKind::Short);
        assert_eq!(id.as_str(), "1710034065");
    }

    #[test]
    fn wrong_check_digit_rejected() {
        assert!(!validate_short_form("1710034066"));
        assert_eq!(
            IdentityNumber::parse("1726386237"),
            Err(IdentityError::InvalidCheckDigit)
        );
    }

    #[test]
    fn sum_already_multiple_of_ten_gives_zero_check_digit() {
        // 0,1,0,0,0,0,0,0,0 -> doubled 0 + 1 + ... = 1 -> check 9
        assert!(validate_short_form("0100000009"));
        // 1,9,0,0,0,0,0,0,0 -> 2 + 9 = 11 -> check 9
        assert!(validate_short_form("1900000009"));
        // 1,8,0,0,0,0,0,0,0 -> 2 + 8 = 10 -> check 0
        assert!(validate_short_form("1800000000"));
    }

    #[test]
    fn region_code_out_of_range() {
        assert_eq!(
            IdentityNumber::parse("2500000000"),
            Err(IdentityError::InvalidRegion(25))
        );
        assert_eq!(
            IdentityNumber::parse("0000000000"),
            Err(IdentityError::InvalidRegion(0))
        );
        assert!(!validate_short_form("2512345678"));
        assert_eq!(
            IdentityNumber::parse("9912345678001"),
            Err(IdentityError::InvalidRegion(99))
        );
    }

    #[test]
    fn format_errors() {
        assert_eq!(IdentityNumber::parse(""), Err(IdentityError::Empty));
        assert_eq!(
            IdentityNumber::parse("17100340a5"),
            Err(IdentityError::NonDigit)
        );
        assert_eq!(
            IdentityNumber::parse(" 1710034065"),
            Err(IdentityError::NonDigit)
        );
        assert_eq!(
            IdentityNumber::parse("171003406"),
            Err(IdentityError::InvalidLength(9))
        );
        assert_eq!(
            IdentityNumber::parse("171003406500"),
            Err(IdentityError::InvalidLength(12))
        );
        assert!(!validate_short_form("1710034065001"));
    }

    #[test]
    fn long_form_skips_check_digit() {
        let id = IdentityNumber::parse("1726386236001").unwrap();
        assert_eq!(id.kind(), IdentityKind::Long);

        // Body with a bad short-form check digit is still accepted in long form
        assert!(IdentityNumber::parse("1726386237001").is_ok());
    }

    #[test]
    fn validation_is_idempotent() {
        for input in ["1710034065", "1710034066", "2500000000", "abc"] {
            assert_eq!(validate_short_form(input), validate_short_form(input));
            assert_eq!(IdentityNumber::parse(input), IdentityNumber::parse(input));
        }
    }

    #[test]
    fn masked_keeps_last_four() {
        let id = IdentityNumber::parse("1710034065").unwrap();
        assert_eq!(id.masked(), "******4065");
    }

    #[test]
    fn serde_round_trip_validates() {
        let id: IdentityNumber = serde_json::from_str("\"1726386236\"").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"1726386236\"");

        let invalid: Result<IdentityNumber, _> = serde_json::from_str("\"1726386237\"");
        assert!(invalid.is_err());
    }
}
