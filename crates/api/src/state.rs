// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Server state management module
//!
//! This module provides shared application state for the lookup server,
//! including configuration, the lookup service and coordinated cancellation.

use std::{sync::Arc, time::Instant};

use portal_client::{HealthStatus, PresetAuthenticator};
use registry_lookup::{LookupService, PoolStatus};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

use crate::{
    config::{Environment, ServerConfig},
    metrics,
};

/// Lookup service wired to the preset-credentials authenticator
pub type Lookup = LookupService<PresetAuthenticator>;

/// Shared application state with cancellation token support
#[derive(Debug, Clone)]
pub struct ServerState {
    /// Server configuration
    config: ServerConfig,
    /// Lookup orchestrator and its session pool
    lookup: Arc<Lookup>,
    /// Cancellation token for coordinated shutdown
    pub cancellation_token: CancellationToken,
}

impl ServerState {
    /// Create new server state
    pub fn new(
        config: ServerConfig,
        lookup: Arc<Lookup>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            config,
            lookup,
            cancellation_token,
        }
    }

    /// Server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Lookup service
    pub fn lookup(&self) -> &Arc<Lookup> {
        &self.lookup
    }

    /// Pool snapshot, also published to the pool gauges
    pub fn pool_status(&self) -> PoolStatus {
        let status = self.lookup.pool_status();
        metrics::update_pool_gauges(&status);
        status
    }

    /// Derive service health from the pool
    ///
    /// The service stays available while the pool is empty because the public
    /// registries still answer; it is `Down` only once the pool was closed.
    pub fn health_check(&self) -> HealthCheck {
        let started = Instant::now();
        let pool = self.pool_status();
        let status = HealthStatus::for_sessions(pool.ready, pool.total, pool.closed);

        HealthCheck {
            status,
            version: Box::from(env!("CARGO_PKG_VERSION")),
            environment: self.config.environment,
            timestamp: chrono::Utc::now().to_rfc3339(),
            response_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            pool,
        }
    }
}

/// Health check status
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthCheck {
    /// Service status
    pub status: HealthStatus,
    /// Service version
    #[schema(value_type = String)]
    pub version: Box<str>,
    /// Environment
    pub environment: Environment,
    /// Timestamp
    pub timestamp: String,
    /// Time taken to build this report
    pub response_time_ms: u64,
    /// Session pool snapshot
    pub pool: PoolStatus,
}
