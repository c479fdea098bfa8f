// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Custom extractors for improved error handling
//!
//! This module provides a JSON extractor that reports malformed request bodies
//! as `invalid_json` errors with a hint, instead of Axum's plain-text rejection.

use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;

use crate::error::ServerError;

mod error_hints {
    pub const IDENTIFIER_FORMAT: &str =
        "identifiers must be JSON strings of digits, numbers lose leading zeros";
    pub const MISSING_COMMA: &str =
        "check for missing or extra commas between object properties or array elements";
    pub const MISSING_BRACE: &str = "check for missing closing brace '}' for JSON object";
    pub const MISSING_BRACKET: &str = "check for missing closing bracket ']' for JSON array";
    pub const MISSING_QUOTES: &str =
        "check for missing or improperly escaped quotes around string values";
    pub const CONTROL_CHARS: &str = "JSON contains invalid control characters that must be escaped";
    pub const EXPECTED_VALUE: &str =
        "expected a valid JSON value (string, number, boolean, null, object, or array)";
    pub const DEFAULT_SYNTAX: &str = "check JSON formatting and structure";
    pub const EMPTY_BODY: &str = "request body is empty, expected valid JSON";
    pub const TRUNCATED_JSON: &str =
        "unexpected end of JSON input, request appears to be truncated";
}

/// Largest accepted body; batch requests stay far below this
const MAX_JSON_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Serde reports a non-string where an identifier string was expected
fn is_identifier_type_error(err_msg: &str) -> bool {
    err_msg.contains("invalid type") && err_msg.contains("expected a string")
}

/// Custom JSON extractor that provides detailed error messages for parsing failures
#[derive(Debug)]
pub struct JsonExtractor<T>(pub T);

impl<T, S> FromRequest<S> for JsonExtractor<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Self::extract_json(req, state).await
    }
}

impl<T> JsonExtractor<T>
where
    T: DeserializeOwned,
{
    async fn extract_json<S>(req: Request, state: &S) -> Result<Self, ServerError>
    where
        S: Send + Sync,
    {
        if let Some(content_type) = req.headers().get("content-type")
            && let Ok(content_type_str) = content_type.to_str()
            && !content_type_str.starts_with("application/json")
        {
            return Err(ServerError::JsonError {
                message: format!(
                    "invalid content-type: expected 'application/json', got '{content_type_str}'"
                ),
            });
        }

        let bytes = axum::body::Bytes::from_request(req, state)
            .await
            .map_err(|rejection| ServerError::JsonError {
                message: format!("failed to read request body: {rejection}"),
            })?;

        if bytes.len() > MAX_JSON_PAYLOAD_SIZE {
            return Err(ServerError::JsonError {
                message: format!(
                    "request body too large: {} bytes (max: {MAX_JSON_PAYLOAD_SIZE} bytes)",
                    bytes.len()
                ),
            });
        }

        if bytes.is_empty() {
            return Err(ServerError::JsonError {
                message: error_hints::EMPTY_BODY.to_string(),
            });
        }

        serde_json::from_slice::<T>(&bytes)
            .map(JsonExtractor)
            .map_err(|err| ServerError::JsonError {
                message: describe_json_error(&err, &bytes),
            })
    }
}

fn describe_json_error(err: &serde_json::Error, raw_json: &[u8]) -> String {
    if err.is_syntax() {
        format!(
            "invalid JSON syntax at line {}, column {}: {}",
            err.line(),
            err.column(),
            get_json_syntax_hint(err)
        )
    } else if err.is_data() {
        format!(
            "JSON data validation failed: {}",
            get_data_validation_hint_with_context(err, raw_json)
        )
    } else if err.is_eof() {
        error_hints::TRUNCATED_JSON.to_string()
    } else {
        format!("JSON parsing error: {err}")
    }
}

/// Provides helpful hints for JSON syntax errors
fn get_json_syntax_hint(err: &serde_json::Error) -> &'static str {
    let err_msg = err.to_string();

    if err_msg.contains("expected ','") || err_msg.contains("trailing comma") {
        error_hints::MISSING_COMMA
    } else if err_msg.contains("expected '}'") {
        error_hints::MISSING_BRACE
    } else if err_msg.contains("expected ']'") {
        error_hints::MISSING_BRACKET
    } else if err_msg.contains("expected '\"'") {
        error_hints::MISSING_QUOTES
    } else if err_msg.contains("control character") {
        error_hints::CONTROL_CHARS
    } else if err_msg.contains("expected value") {
        error_hints::EXPECTED_VALUE
    } else {
        error_hints::DEFAULT_SYNTAX
    }
}

/// Provides helpful hints for data validation errors with JSON context
fn get_data_validation_hint_with_context(err: &serde_json::Error, raw_json: &[u8]) -> String {
    let err_msg = err.to_string();

    if is_identifier_type_error(&err_msg) {
        if let Some(offending) = extract_non_string_identifiers(raw_json)
            && !offending.is_empty()
        {
            return format!(
                "invalid identifier format - the following values are not strings: [{}]. {}",
                offending.join(", "),
                error_hints::IDENTIFIER_FORMAT
            );
        }

        return format!(
            "invalid identifier format - {}",
            error_hints::IDENTIFIER_FORMAT
        );
    }

    get_data_validation_hint(err)
}

/// Provides helpful hints for data validation errors
fn get_data_validation_hint(err: &serde_json::Error) -> String {
    let err_msg = err.to_string();

    if err_msg.contains("invalid type") {
        if err_msg.contains("expected string") {
            "expected a string value, but received a different data type".to_string()
        } else if err_msg.contains("expected integer") || err_msg.contains("expected number") {
            "expected a numeric value, but received a different data type".to_string()
        } else if err_msg.contains("expected boolean") {
            "expected a boolean value (true or false), but received a different data type"
                .to_string()
        } else if err_msg.contains("expected array") {
            "expected an array, but received a different data type".to_string()
        } else if err_msg.contains("expected object") {
            "expected a JSON object, but received a different data type".to_string()
        } else {
            format!("data type mismatch: {err_msg}")
        }
    } else if err_msg.contains("missing field") {
        format!("required field is missing: {err_msg}")
    } else if err_msg.contains("unknown field") {
        format!("unrecognized field found: {err_msg}")
    } else {
        err_msg
    }
}

/// Collects `identifier` / `identifiers` values that are not JSON strings
fn extract_non_string_identifiers(raw_json: &[u8]) -> Option<Vec<String>> {
    let json_value: serde_json::Value = serde_json::from_slice(raw_json).ok()?;

    let values: Vec<&serde_json::Value> = match (
        json_value.get("identifiers"),
        json_value.get("identifier"),
    ) {
        (Some(serde_json::Value::Array(items)), _) => items.iter().collect(),
        (Some(single), _) | (None, Some(single)) => vec![single],
        (None, None) => return None,
    };

    Some(
        values
            .into_iter()
            .filter(|value| !value.is_string())
            .map(ToString::to_string)
            .collect(),
    )
}
