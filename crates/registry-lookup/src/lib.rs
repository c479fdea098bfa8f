// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Identity and tax-registry lookups with a session pool and public fallback
//!
//! This crate resolves identity numbers to registry records through two paths: a
//! fast path over a small pool of pre-authenticated portal sessions, and a slow
//! path over public, unauthenticated sources.
//!
//! # Architecture
//!
//! - **Query Channel**: [`channel::QueryChannel`] - one authenticated portal session
//! - **Channel Pool**: [`pool::ChannelPool`] - round-robin leasing with guaranteed release
//! - **Fallback**: [`fallback::FallbackResolver`] - civil-registry mirror and tax registry
//! - **Orchestrator**: [`orchestrator::LookupService`] - validation, cascade and batch fan-out
//! - **Parsers**: [`parse`] - markup parsers for the portal and the mirror
//!
//! # Features
//!
//! - **Exclusive Leases**: A channel serves one query at a time and is always returned
//! - **Graceful Degradation**: Any fast-path failure cascades to exactly one fallback call
//! - **Bounded Latency**: Every network call runs under its own timeout
//! - **Testing Support**: Integration tests use wiremock for HTTP simulation

pub mod channel;
pub mod fallback;
pub mod orchestrator;
pub mod parse;
pub mod pool;

pub use channel::{ChannelConfig, ChannelState, QueryChannel, QueryError};
pub use fallback::{FallbackConfig, FallbackError, FallbackResolver};
pub use orchestrator::{BatchReport, BatchSummary, LookupConfig, LookupError, LookupService};
pub use pool::{ChannelLease, ChannelPool, PoolConfig, PoolStatus};
