// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Response parsers for the portal and the public civil-registry mirror
//!
//! Neither source has a documented API, so the parsers work on the markup they
//! return. Every parser yields a complete [`Record`] or nothing: a response
//! without a legal name is treated as "no record".

use std::{borrow::Cow, sync::LazyLock};

use quick_xml::escape::{resolve_html5_entity, unescape_with};
use regex::Regex;
use shared_types::{FallbackSource, IdentityNumber, Record, SourceMethod};

// Compile regexes once at startup - safe because patterns are static
static VIEW_STATE_INPUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"name="javax\.faces\.ViewState"[^>]*value="([^"]*)""#)
        .expect("view state input regex is valid")
});
static VIEW_STATE_UPDATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"javax\.faces\.ViewState[^>]*><!\[CDATA\[([^\]]*)\]\]>")
        .expect("view state update regex is valid")
});
static SELECTED_OPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"selected="selected"[^>]*>([^<]+)</option>"#)
        .expect("selected option regex is valid")
});
static CIVIL_REGISTRY_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<td[^>]*id="name0"[^>]*>\s*<a[^>]*>\s*([^<]+?)\s*</a>"#)
        .expect("civil registry name regex is valid")
});

static BUYER_LEGAL_NAME: LazyLock<Regex> = LazyLock::new(|| buyer_field_regex("RazonSocial"));
static BUYER_ADDRESS: LazyLock<Regex> = LazyLock::new(|| buyer_field_regex("Direccion"));
static BUYER_PHONE: LazyLock<Regex> = LazyLock::new(|| buyer_field_regex("Telefono"));
static BUYER_EMAIL: LazyLock<Regex> = LazyLock::new(|| buyer_field_regex("Email"));

/// Prefix of the buyer fields on the portal invoice form
const BUYER_FIELD_PREFIX: &str = "form:busquedaCompradorComp:comprador";

fn buyer_field_regex(field: &str) -> Regex {
    let pattern = format!(
        r#"id="{}{field}"[^>]*value="([^"]*)""#,
        regex::escape(BUYER_FIELD_PREFIX)
    );
    Regex::new(&pattern).expect("buyer field regex is valid")
}

/// Markers of a response that bounced to the login page
const SESSION_LOST_MARKERS: [&str; 3] = ["<redirect", "j_security_check", "j_username"];

/// Extract the JSF view-state token from a full page or a partial response
pub fn extract_view_state(body: &str) -> Option<String> {
    VIEW_STATE_INPUT
        .captures(body)
        .or_else(|| VIEW_STATE_UPDATE.captures(body))
        .and_then(|captures| captures.get(1))
        .map(|m| unescape_html(m.as_str()))
        .filter(|token| !token.is_empty())
}

/// Whether the portal answered with the login page or a redirect to it
pub fn is_session_lost(body: &str) -> bool {
    SESSION_LOST_MARKERS
        .iter()
        .any(|marker| body.contains(marker))
}

/// Parse the partial response of a buyer lookup on the portal
///
/// Returns `None` when the response carries no legal name.
pub fn parse_fast_path_response(body: &str, identifier: &IdentityNumber) -> Option<Record> {
    let legal_name = buyer_field(body, &BUYER_LEGAL_NAME).filter(|name| !name.is_empty())?;

    let mut record = Record::new(identifier.clone(), legal_name, SourceMethod::Fast)
        .with_address(buyer_field(body, &BUYER_ADDRESS).unwrap_or_default())
        .with_phone(buyer_field(body, &BUYER_PHONE).unwrap_or_default())
        .with_email(buyer_field(body, &BUYER_EMAIL).unwrap_or_default());

    if let Some(selected) = SELECTED_OPTION.captures(body).and_then(|c| c.get(1)) {
        record = record.with_identification_type(unescape_html(selected.as_str().trim()));
    }

    Some(record)
}

/// Parse the result table of the public civil-registry mirror
///
/// Returns `None` when the first result row is missing or empty.
pub fn parse_civil_registry_response(body: &str, identifier: &IdentityNumber) -> Option<Record> {
    let legal_name = CIVIL_REGISTRY_NAME
        .captures(body)
        .and_then(|captures| captures.get(1))
        .map(|m| unescape_html(m.as_str()))
        .filter(|name| !name.is_empty())?;

    Some(Record::new(
        identifier.clone(),
        legal_name,
        SourceMethod::Fallback(FallbackSource::CivilRegistry),
    ))
}

fn buyer_field(body: &str, field: &Regex) -> Option<String> {
    field
        .captures(body)
        .and_then(|captures| captures.get(1))
        .map(|m| unescape_html(m.as_str().trim()))
}

/// Decode character references and HTML entities in an attribute value
///
/// Malformed or unknown references leave the value as received.
fn unescape_html(raw: &str) -> String {
    unescape_with(raw, resolve_html5_entity).map_or_else(|_| raw.to_string(), Cow::into_owned)
}
