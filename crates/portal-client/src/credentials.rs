// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Portal session credentials

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// Cookie set and anti-forgery token for one portal session
///
/// Owned by a single query channel and never mutated; a channel whose session is
/// lost is discarded together with its credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    cookies: BTreeMap<String, String>,
    token: Option<String>,
    issued_at: DateTime<Utc>,
}

impl Credentials {
    /// Create credentials issued now
    pub fn new(cookies: BTreeMap<String, String>, token: Option<String>) -> Self {
        Self {
            cookies,
            token: token.filter(|t| !t.is_empty()),
            issued_at: Utc::now(),
        }
    }

    /// Session cookies by name
    pub fn cookies(&self) -> &BTreeMap<String, String> {
        &self.cookies
    }

    /// Anti-forgery token captured at login, if any
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// When the session was established
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Whether there is at least one cookie to carry the session
    pub fn has_session(&self) -> bool {
        !self.cookies.is_empty()
    }

    /// Value for a `Cookie` request header
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("cookies", &self.cookies.keys().collect::<Vec<_>>())
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_header_is_sorted_by_name() {
        let cookies = BTreeMap::from([
            ("JSESSIONID".to_string(), "abc".to_string()),
            ("BIGipServer".to_string(), "123".to_string()),
        ]);
        let credentials = Credentials::new(cookies, Some("view-state".to_string()));

        assert_eq!(credentials.cookie_header(), "BIGipServer=123; JSESSIONID=abc");
        assert_eq!(credentials.token(), Some("view-state"));
        assert!(credentials.has_session());
    }

    #[test]
    fn empty_token_is_dropped() {
        let credentials = Credentials::new(BTreeMap::new(), Some(String::new()));
        assert!(credentials.token().is_none());
        assert!(!credentials.has_session());
        assert_eq!(credentials.cookie_header(), "");
    }

    #[test]
    fn debug_shows_cookie_names_only() {
        let cookies = BTreeMap::from([("JSESSIONID".to_string(), "abc123".to_string())]);
        let credentials = Credentials::new(cookies, Some("view-state".to_string()));
        let debug = format!("{credentials:?}");

        assert!(debug.contains("JSESSIONID"));
        assert!(!debug.contains("abc123"));
        assert!(!debug.contains("view-state"));
    }
}
