// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Authenticator backed by session material supplied through configuration

use std::collections::BTreeMap;

use tracing::debug;

use crate::{AuthError, Authenticator, Credentials};

/// Serves the same transferred session material on every call
///
/// The interactive login runs elsewhere and hands over its cookies and token;
/// every channel bootstrapped from this authenticator shares that session.
#[derive(Debug, Clone)]
pub struct PresetAuthenticator {
    cookies: BTreeMap<String, String>,
    token: Option<String>,
}

impl PresetAuthenticator {
    /// Create a new preset authenticator
    pub fn new(cookies: BTreeMap<String, String>, token: Option<String>) -> Self {
        Self { cookies, token }
    }

    /// Whether any session material was supplied
    pub fn is_configured(&self) -> bool {
        !self.cookies.is_empty()
    }
}

impl Authenticator for PresetAuthenticator {
    async fn authenticate(&self) -> Result<Credentials, AuthError> {
        if self.cookies.is_empty() {
            return Err(AuthError::IncompleteCredentials {
                message: "no session cookies configured".to_string(),
            });
        }

        debug!(
            cookies = self.cookies.len(),
            has_token = self.token.is_some(),
            "Issuing preset portal credentials"
        );
        Ok(Credentials::new(self.cookies.clone(), self.token.clone()))
    }

    fn name(&self) -> &'static str {
        "preset"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_missing_cookies() {
        let authenticator = PresetAuthenticator::new(BTreeMap::new(), Some("token".to_string()));
        assert!(!authenticator.is_configured());

        let result = authenticator.authenticate().await;
        assert!(matches!(result, Err(AuthError::IncompleteCredentials { .. })));
    }

    #[tokio::test]
    async fn issues_configured_session() {
        let cookies = BTreeMap::from([("JSESSIONID".to_string(), "abc".to_string())]);
        let authenticator = PresetAuthenticator::new(cookies.clone(), None);

        let credentials = authenticator.authenticate().await.unwrap();
        assert_eq!(credentials.cookies(), &cookies);
        assert!(credentials.token().is_none());
        assert_eq!(authenticator.name(), "preset");
    }
}
