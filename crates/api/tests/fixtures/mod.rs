// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0
#![allow(dead_code)]

//! Test fixtures for the lookup server
//!
//! Provides registry and portal mocks plus helpers to start a server wired
//! against them.

pub mod registries;

use std::net::SocketAddr;

use api::{Server, ServerConfig, ShutdownConfig};
pub use registries::*;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::MockServer;

pub const ADMIN_TOKEN: &str = "admin-s3cret";

/// Testing configuration with every upstream pointed at `upstream`
pub fn config_for(upstream: &MockServer) -> ServerConfig {
    let base = upstream.uri();
    let mut config = ServerConfig::for_testing();
    config.pool.portal_url = Url::parse(&format!("{base}{PORTAL_PATH}")).unwrap();
    config.fallback.civil_registry_url = Url::parse(&format!("{base}{CIVIL_REGISTRY_PATH}")).unwrap();
    config.fallback.tax_registry_url = Url::parse(&format!("{base}{TAX_REGISTRY_PATH}")).unwrap();
    config.fallback.establishments_url = Url::parse(&format!("{base}{ESTABLISHMENTS_PATH}")).unwrap();
    config
}

/// Same as [`config_for`] with one preset portal session
pub fn config_with_session(upstream: &MockServer) -> ServerConfig {
    let mut config = config_for(upstream);
    config.pool.max_sessions = 1;
    config.credentials.cookie_header = Some("JSESSIONID=test-session".to_string());
    config.credentials.token = Some(LOGIN_TOKEN.to_string());
    config
}

/// Start a server and return its base URL
pub async fn start(config: ServerConfig) -> (String, CancellationToken) {
    let (addr, token): (SocketAddr, CancellationToken) = Server::new(config, ShutdownConfig::default())
        .expect("Failed to create server")
        .run_for_testing()
        .await
        .expect("Failed to start test server");
    (format!("http://{addr}"), token)
}
