// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Registry Lookup API Server
//!
//! HTTP front end for resolving national identity numbers and tax registry
//! numbers to registered names. Lookups go through a pool of authenticated
//! portal sessions first and fall back to the public civil and tax registries.
//!
//! # Module Structure
//!
//! - [`config`]: Server configuration loaded from defaults, files and `SERVER_*` variables
//! - [`error`]: Error types and their JSON response mapping
//! - [`extractors`]: JSON body extractor with identifier-aware error messages
//! - [`metrics`]: Prometheus counters, histograms and pool gauges
//! - [`middleware`]: Per-IP rate limiting and the admin bearer-token guard
//! - [`state`]: Shared application state and health derivation
//! - [`server`]: Server lifecycle, pool bootstrap and coordinated shutdown
//! - [`routes`]: Route table and request handlers
//! - [`docs`] / [`openapi`]: `OpenAPI` document and Swagger UI
//!
//! # Key Features
//!
//! - **Two-tier lookup**: pooled portal sessions with public registry fallback
//! - **Batch lookups**: concurrent fan-out with results in input order
//! - **Graceful Shutdown**: listener drain followed by closing every portal session
//! - **Rate Limiting**: IP-based request limiting with configurable requests per minute
//! - **Health Monitoring**: `Up`, `Degraded` or `Down` derived from the session pool

pub mod config;
pub mod docs;
pub mod error;
pub mod extractors;
pub mod metrics;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod server;
pub mod state;

pub use config::{Environment, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use server::{Server, ShutdownConfig};
pub use shared_types::{FailureReason, IdentityKind, IdentityNumber, Record, SourceMethod};
pub use state::{HealthCheck, Lookup, ServerState};
