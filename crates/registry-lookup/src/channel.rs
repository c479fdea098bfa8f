// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Authenticated query channel against the interactive portal
//!
//! A [`QueryChannel`] owns one portal session: the credentials handed over by
//! the [`Authenticator`] and an HTTP client that carries their cookies on every
//! request. The portal is a JSF application, so each lookup is a partial-ajax
//! form post that must echo the current view-state token; the channel keeps that
//! token and re-fetches it from the portal page once it is missing or stale.

use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

use portal_client::{AuthError, Authenticator, Credentials};
use reqwest::{
    Client, StatusCode,
    header::{COOKIE, HeaderMap, HeaderValue, REFERER},
};
use serde::Serialize;
use shared_types::{FailureReason, IdentityNumber, Record};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;
use utoipa::ToSchema;

use crate::parse::{extract_view_state, is_session_lost, parse_fast_path_response};

const USER_AGENT: &str = concat!("registry-lookup/", env!("CARGO_PKG_VERSION"));

/// Default portal page hosting the buyer lookup form
pub const DEFAULT_PORTAL_URL: &str = "https://facturadorsri.sri.gob.ec/portal-facturadorsri-internet/pages/comprobantes/factura/Factura.html";

/// Lifecycle state of a query channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    /// Created, no session yet
    Unauthenticated,
    /// Session established, free for a query
    Ready,
    /// Serving exactly one query
    Busy,
    /// Session lost or ambiguous, never reused
    Failed,
    /// Released on pool shutdown
    Closed,
}

/// Configuration shared by every channel of a pool
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Portal page that hosts the lookup form
    pub portal_url: Url,
    /// Budget for one fast-path query, token refresh included
    pub query_timeout: Duration,
    /// Age after which the view-state token is re-fetched
    pub token_max_age: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            portal_url: Url::parse(DEFAULT_PORTAL_URL).expect("default portal url is valid"),
            query_timeout: Duration::from_secs(3),
            token_max_age: Duration::from_secs(600),
        }
    }
}

/// Errors of a single fast-path query
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum QueryError {
    /// Portal no longer accepts the session
    #[error("Portal session lost")]
    Unauthorized,

    /// Portal answered without a legal name
    #[error("No record on the portal")]
    NotFound,

    /// Query did not finish within the channel budget
    #[error("Portal query timeout after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// Portal answered with an error status or unusable body
    #[error("Portal error: {status} - {message}")]
    Upstream { status: u16, message: String },

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl QueryError {
    /// Whether the caller should retire the channel
    pub fn is_session_lost(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// Classified reason
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::Unauthorized => FailureReason::Unauthenticated,
            Self::NotFound => FailureReason::NotFound,
            Self::Timeout { .. } => FailureReason::Timeout,
            Self::Upstream { .. } | Self::Http(_) => FailureReason::UpstreamError,
        }
    }
}

#[derive(Debug, Clone)]
struct SessionToken {
    value: String,
    fetched_at: Instant,
}

#[derive(Debug)]
struct Session {
    credentials: Credentials,
    client: Client,
}

/// One authenticated conduit to the portal
#[derive(Debug)]
pub struct QueryChannel {
    id: usize,
    config: ChannelConfig,
    session: Option<Session>,
    token: Mutex<Option<SessionToken>>,
}

impl QueryChannel {
    /// Create an unauthenticated channel
    pub fn new(id: usize, config: ChannelConfig) -> Self {
        Self {
            id,
            config,
            session: None,
            token: Mutex::new(None),
        }
    }

    /// Channel identifier, stable for the lifetime of a pool generation
    pub fn id(&self) -> usize {
        self.id
    }

    /// Whether a session was established
    ///
    /// Lifecycle state (busy, failed, closed) is tracked by the pool.
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    /// Credentials of the session, if authenticated
    pub fn credentials(&self) -> Option<&Credentials> {
        self.session.as_ref().map(|s| &s.credentials)
    }

    /// Establish the session through the authentication collaborator
    ///
    /// On failure the channel stays unauthenticated.
    pub async fn authenticate<A: Authenticator>(
        &mut self,
        authenticator: &A,
    ) -> Result<(), AuthError> {
        let credentials = authenticator.authenticate().await?;
        if !credentials.has_session() {
            return Err(AuthError::IncompleteCredentials {
                message: "authenticator returned no session cookies".to_string(),
            });
        }

        let cookie = HeaderValue::from_str(&credentials.cookie_header()).map_err(|e| {
            AuthError::IncompleteCredentials {
                message: format!("cookie header is not valid: {e}"),
            }
        })?;
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, cookie);

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AuthError::Automation { error: e.into() })?;

        let token = credentials.token().map(|value| SessionToken {
            value: value.to_string(),
            fetched_at: Instant::now(),
        });
        *self.token.get_mut().unwrap_or_else(std::sync::PoisonError::into_inner) = token;
        self.session = Some(Session {
            credentials,
            client,
        });

        info!(channel_id = self.id, authenticator = authenticator.name(), "Portal channel authenticated");
        Ok(())
    }

    /// Look up one identifier on the portal
    ///
    /// Bounded by the configured query timeout. A timeout drops the cached
    /// view-state token but leaves the session usable.
    pub async fn query(&self, identifier: &IdentityNumber) -> Result<Record, QueryError> {
        let Some(session) = &self.session else {
            return Err(QueryError::Unauthorized);
        };

        let budget = self.config.query_timeout;
        match timeout(budget, self.query_portal(session, identifier)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(channel_id = self.id, identifier = %identifier.masked(), "Portal query timed out");
                self.clear_token();
                Err(QueryError::Timeout {
                    timeout_ms: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }

    /// Re-fetch the view-state token from the portal page
    pub async fn refresh_session_token(&self) -> Result<String, QueryError> {
        let Some(session) = &self.session else {
            return Err(QueryError::Unauthorized);
        };
        self.fetch_token(&session.client).await
    }

    /// Release the session through the authentication collaborator
    pub async fn close<A: Authenticator>(&self, authenticator: &A) {
        if let Some(session) = &self.session {
            authenticator.release(&session.credentials).await;
        }
        self.clear_token();
        debug!(channel_id = self.id, "Portal channel closed");
    }

    async fn query_portal(
        &self,
        session: &Session,
        identifier: &IdentityNumber,
    ) -> Result<Record, QueryError> {
        let token = match self.cached_token() {
            Some(token) => token,
            None => self.fetch_token(&session.client).await?,
        };

        let source = "form:busquedaCompradorComp:ruc";
        let render = "form:busquedaCompradorComp";
        let form = [
            ("javax.faces.partial.ajax", "true"),
            ("javax.faces.source", source),
            ("javax.faces.partial.execute", source),
            ("javax.faces.partial.render", render),
            ("javax.faces.behavior.event", "valueChange"),
            ("javax.faces.partial.event", "change"),
            ("form", "form"),
            (source, identifier.as_str()),
            ("javax.faces.ViewState", token.as_str()),
        ];

        let response = session
            .client
            .post(self.config.portal_url.clone())
            .header("faces-request", "partial/ajax")
            .header("X-Requested-With", "XMLHttpRequest")
            .header(REFERER, self.config.portal_url.as_str())
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Err(QueryError::Unauthorized),
            s if !s.is_success() => {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                warn!(channel_id = self.id, status = s.as_u16(), "Portal query failed");
                return Err(QueryError::Upstream {
                    status: s.as_u16(),
                    message,
                });
            }
            _ => {}
        }

        let body = response.text().await?;
        if is_session_lost(&body) {
            self.clear_token();
            return Err(QueryError::Unauthorized);
        }
        if let Some(next) = extract_view_state(&body) {
            self.store_token(next);
        }

        parse_fast_path_response(&body, identifier).ok_or(QueryError::NotFound)
    }

    async fn fetch_token(&self, client: &Client) -> Result<String, QueryError> {
        let response = client.get(self.config.portal_url.clone()).send().await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(QueryError::Unauthorized);
        }
        if !status.is_success() {
            return Err(QueryError::Upstream {
                status: status.as_u16(),
                message: "portal page unavailable".to_string(),
            });
        }

        let body = response.text().await?;
        if is_session_lost(&body) {
            return Err(QueryError::Unauthorized);
        }
        let token = extract_view_state(&body).ok_or_else(|| QueryError::Upstream {
            status: status.as_u16(),
            message: "portal page has no view state".to_string(),
        })?;

        debug!(channel_id = self.id, "Refreshed portal view state");
        self.store_token(token.clone());
        Ok(token)
    }

    fn cached_token(&self) -> Option<String> {
        let guard = self.token.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard
            .as_ref()
            .filter(|token| token.fetched_at.elapsed() < self.config.token_max_age)
            .map(|token| token.value.clone())
    }

    fn store_token(&self, value: String) {
        let mut guard = self.token.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = Some(SessionToken {
            value,
            fetched_at: Instant::now(),
        });
    }

    fn clear_token(&self) {
        let mut guard = self.token.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = None;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[derive(Debug)]
    struct NoCookies;

    impl Authenticator for NoCookies {
        async fn authenticate(&self) -> Result<Credentials, AuthError> {
            Ok(Credentials::new(BTreeMap::new(), None))
        }

        fn name(&self) -> &'static str {
            "no-cookies"
        }
    }

    #[tokio::test]
    async fn empty_session_stays_unauthenticated() {
        let mut channel = QueryChannel::new(0, ChannelConfig::default());
        let result = channel.authenticate(&NoCookies).await;

        assert!(matches!(result, Err(AuthError::IncompleteCredentials { .. })));
        assert!(!channel.is_authenticated());
        assert!(channel.credentials().is_none());
    }

    #[tokio::test]
    async fn unauthenticated_channel_refuses_queries() {
        let channel = QueryChannel::new(0, ChannelConfig::default());
        let id = IdentityNumber::parse("1710034065").unwrap();

        assert!(matches!(channel.query(&id).await, Err(QueryError::Unauthorized)));
    }

    #[test]
    fn query_error_reasons() {
        assert!(QueryError::Unauthorized.is_session_lost());
        assert!(!QueryError::NotFound.is_session_lost());
        assert_eq!(QueryError::Timeout { timeout_ms: 10 }.reason(), FailureReason::Timeout);
        assert_eq!(
            QueryError::Upstream {
                status: 500,
                message: String::new()
            }
            .reason(),
            FailureReason::UpstreamError
        );
    }
}
