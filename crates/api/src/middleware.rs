// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Middleware module for HTTP request processing
//!
//! This module provides per-IP rate limiting for the lookup endpoints and the
//! bearer-token check guarding pool administration.

use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::{
    config::{AdminConfig, RateLimitingConfig},
    error::ServerError,
};

const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
const MAX_RATE_LIMIT_ENTRIES: usize = 10_000;

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Request admitted
    Allowed {
        /// Requests left in the current window
        remaining: u32,
    },
    /// Request rejected until the window rolls over
    Limited {
        /// Seconds until the window resets
        retry_after_secs: u64,
    },
}

/// Rate limiting middleware state
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitingConfig,
    requests: Arc<DashMap<IpAddr, RequestCounter>>,
}

#[derive(Debug, Clone)]
struct RequestCounter {
    count: u32,
    window_start: Instant,
}

impl RateLimiter {
    /// Create a new rate limiter with the given configuration
    pub fn new(config: RateLimitingConfig) -> Self {
        Self {
            config,
            requests: Arc::new(DashMap::new()),
        }
    }

    /// Check if rate limiting is enabled
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Count a request from `ip` and decide whether it is admitted
    pub fn check(&self, ip: IpAddr) -> RateDecision {
        if !self.config.enabled {
            return RateDecision::Allowed {
                remaining: self.config.requests_per_minute,
            };
        }

        let now = Instant::now();
        if self.requests.len() > MAX_RATE_LIMIT_ENTRIES {
            self.cleanup_expired_entries(now);
        }

        let counter = self
            .requests
            .entry(ip)
            .and_modify(|counter| {
                if now.duration_since(counter.window_start) > RATE_LIMIT_WINDOW {
                    counter.count = 1;
                    counter.window_start = now;
                } else {
                    counter.count = counter.count.saturating_add(1);
                }
            })
            .or_insert_with(|| RequestCounter {
                count: 1,
                window_start: now,
            });

        let limit = self.config.requests_per_minute;
        if counter.count > limit {
            let elapsed = now.duration_since(counter.window_start);
            let retry_after_secs = RATE_LIMIT_WINDOW.saturating_sub(elapsed).as_secs().max(1);
            debug!(%ip, count = counter.count, limit, "rate limiting client");
            RateDecision::Limited { retry_after_secs }
        } else {
            RateDecision::Allowed {
                remaining: limit - counter.count,
            }
        }
    }

    /// Whether a request from `ip` is rejected
    pub fn is_rate_limited(&self, ip: IpAddr) -> bool {
        matches!(self.check(ip), RateDecision::Limited { .. })
    }

    fn cleanup_expired_entries(&self, now: Instant) {
        let entries_before = self.requests.len();
        self.requests
            .retain(|_, counter| now.duration_since(counter.window_start) <= RATE_LIMIT_WINDOW);

        let entries_after = self.requests.len();
        let cleaned_up = entries_before.saturating_sub(entries_after);
        if cleaned_up > 0 {
            debug!(cleaned_up, "cleaned up expired rate limiter entries");
        }

        if entries_after > MAX_RATE_LIMIT_ENTRIES {
            warn!(
                entries = entries_after,
                "rate limiter still over capacity after cleanup, removing oldest"
            );

            let mut oldest_entries: Vec<_> = self
                .requests
                .iter()
                .map(|entry| (*entry.key(), entry.value().window_start))
                .collect();
            oldest_entries.sort_by_key(|(_, window_start)| *window_start);

            let entries_to_remove = entries_after - MAX_RATE_LIMIT_ENTRIES / 2;
            for (ip, _) in oldest_entries.into_iter().take(entries_to_remove) {
                self.requests.remove(&ip);
            }
        }
    }
}

/// Rate limiting middleware function
pub async fn rate_limiting_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(rate_limiter): State<RateLimiter>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let client_ip = addr.ip();

    match rate_limiter.check(client_ip) {
        RateDecision::Allowed { .. } => next.run(req).await,
        RateDecision::Limited { retry_after_secs } => {
            warn!(%client_ip, retry_after_secs, "rate limit exceeded");
            let mut response = ServerError::RateLimited.into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
            response
        }
    }
}

/// Bearer token guarding the administrative endpoints
#[derive(Clone)]
pub struct AdminAuth {
    token: Option<Arc<str>>,
}

impl AdminAuth {
    /// Build from configuration; a missing or blank token disables admin access
    pub fn new(config: &AdminConfig) -> Self {
        Self {
            token: config.token().map(Arc::from),
        }
    }

    /// Whether admin endpoints accept requests at all
    pub fn is_enabled(&self) -> bool {
        self.token.is_some()
    }

    /// Check an `Authorization` header value
    pub fn authorize(&self, authorization: Option<&str>) -> Result<(), ServerError> {
        let Some(expected) = self.token.as_deref() else {
            return Err(ServerError::AdminDisabled);
        };
        let presented = authorization
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or(ServerError::Unauthorized)?;

        if tokens_match(presented.as_bytes(), expected.as_bytes()) {
            Ok(())
        } else {
            Err(ServerError::Unauthorized)
        }
    }
}

impl std::fmt::Debug for AdminAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminAuth")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Comparison whose running time does not depend on where the inputs differ
fn tokens_match(presented: &[u8], expected: &[u8]) -> bool {
    if presented.len() != expected.len() {
        return false;
    }
    presented
        .iter()
        .zip(expected)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Admin bearer-token middleware
pub async fn admin_auth_middleware(
    State(admin): State<AdminAuth>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ServerError> {
    let authorization = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    if let Err(error) = admin.authorize(authorization) {
        warn!(path = %req.uri().path(), %error, "rejected admin request");
        return Err(error);
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(enabled: bool, requests_per_minute: u32) -> RateLimiter {
        RateLimiter::new(RateLimitingConfig {
            enabled,
            requests_per_minute,
        })
    }

    #[test]
    fn rate_limiter_disabled() {
        let limiter = limiter(false, 1);
        let ip = "127.0.0.1".parse().unwrap();
        for _ in 0..10 {
            assert!(!limiter.is_rate_limited(ip));
        }
    }

    #[test]
    fn rate_limiter_counts_down_remaining() {
        let limiter = limiter(true, 3);
        let ip = "127.0.0.1".parse().unwrap();

        assert_eq!(limiter.check(ip), RateDecision::Allowed { remaining: 2 });
        assert_eq!(limiter.check(ip), RateDecision::Allowed { remaining: 1 });
        assert_eq!(limiter.check(ip), RateDecision::Allowed { remaining: 0 });

        match limiter.check(ip) {
            RateDecision::Limited { retry_after_secs } => {
                assert!((1..=60).contains(&retry_after_secs));
            }
            other => panic!("expected limited, got {other:?}"),
        }
        assert!(limiter.is_rate_limited(ip));
    }

    #[test]
    fn rate_limiter_different_ips() {
        let limiter = limiter(true, 2);
        let ip1 = "127.0.0.1".parse().unwrap();
        let ip2 = "192.168.1.1".parse().unwrap();

        assert!(!limiter.is_rate_limited(ip1));
        assert!(!limiter.is_rate_limited(ip2));
        assert!(!limiter.is_rate_limited(ip1));
        assert!(!limiter.is_rate_limited(ip2));

        assert!(limiter.is_rate_limited(ip1));
        assert!(limiter.is_rate_limited(ip2));
    }

    #[test]
    fn admin_disabled_without_token() {
        let admin = AdminAuth::new(&AdminConfig::default());
        assert!(!admin.is_enabled());
        assert!(matches!(
            admin.authorize(Some("Bearer anything")),
            Err(ServerError::AdminDisabled)
        ));
    }

    #[test]
    fn admin_requires_matching_bearer_token() {
        let admin = AdminAuth::new(&AdminConfig {
            token: Some("s3cret".to_string()),
        });

        assert!(admin.authorize(Some("Bearer s3cret")).is_ok());
        assert!(matches!(
            admin.authorize(Some("Bearer s3cre")),
            Err(ServerError::Unauthorized)
        ));
        assert!(matches!(
            admin.authorize(Some("Basic s3cret")),
            Err(ServerError::Unauthorized)
        ));
        assert!(matches!(
            admin.authorize(None),
            Err(ServerError::Unauthorized)
        ));
    }

    #[test]
    fn admin_debug_hides_token() {
        let admin = AdminAuth::new(&AdminConfig {
            token: Some("s3cret".to_string()),
        });
        assert!(!format!("{admin:?}").contains("s3cret"));
    }
}
