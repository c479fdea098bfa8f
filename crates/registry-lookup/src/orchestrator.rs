// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Lookup orchestration across the session pool and the public fallback
//!
//! A lookup validates the identifier, tries one pooled portal channel if one is
//! free, and otherwise (or on any fast-path failure) resolves through the public
//! fallback, whose answer is final. The fast path is never retried and never
//! raced against the fallback.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use futures::future::join_all;
use portal_client::Authenticator;
use serde::Serialize;
use shared_types::{FailureReason, IdentityError, IdentityNumber, LookupOutcome, Record};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::{
    channel::QueryError,
    fallback::{FallbackError, FallbackResolver},
    pool::{ChannelPool, PoolStatus},
};

/// Batch and deadline limits
#[derive(Debug, Clone)]
pub struct LookupConfig {
    /// Largest accepted batch
    pub max_batch_size: usize,
    /// Deadline for one lookup, fast path and fallback together
    pub deadline: Duration,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 50,
            deadline: Duration::from_secs(10),
        }
    }
}

/// Errors that end a lookup
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum LookupError {
    /// Identifier failed validation, no network call was made
    #[error("Invalid identifier: {0}")]
    InvalidInput(#[from] IdentityError),

    /// No source has a record
    #[error("No record found")]
    NotFound,

    /// Taxpayer is suspended or cancelled
    #[error("Taxpayer is inactive: {0}")]
    Inactive(String),

    /// Fallback or caller deadline elapsed
    #[error("Lookup timeout after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// Fallback failed and the fast path was not attempted
    #[error("Upstream error: {0}")]
    Upstream(FallbackError),

    /// Fast path and fallback both failed
    #[error("All lookup methods failed (fast path: {fast}; fallback: {fallback})")]
    AllMethodsExhausted {
        fast: QueryError,
        fallback: FallbackError,
    },

    /// Batch has no identifiers
    #[error("Batch must contain at least one identifier")]
    EmptyBatch,

    /// Batch exceeds the configured maximum
    #[error("Batch of {size} exceeds the maximum of {max}")]
    BatchTooLarge { size: usize, max: usize },
}

impl LookupError {
    /// Classified reason
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::InvalidInput(_) | Self::EmptyBatch | Self::BatchTooLarge { .. } => {
                FailureReason::InvalidInput
            }
            Self::NotFound => FailureReason::NotFound,
            Self::Inactive(_) => FailureReason::Inactive,
            Self::Timeout { .. } => FailureReason::Timeout,
            Self::Upstream(_) => FailureReason::UpstreamError,
            Self::AllMethodsExhausted { .. } => FailureReason::AllMethodsExhausted,
        }
    }

    fn from_fallback(error: FallbackError, fast: Option<QueryError>) -> Self {
        match (error, fast) {
            (FallbackError::NotFound, _) => Self::NotFound,
            (FallbackError::Inactive(reason), _) => Self::Inactive(reason),
            (FallbackError::Timeout { timeout_ms }, _) => Self::Timeout { timeout_ms },
            (fallback, Some(fast)) => Self::AllMethodsExhausted { fast, fallback },
            (fallback, None) => Self::Upstream(fallback),
        }
    }
}

/// Aggregate statistics of a batch
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct BatchSummary {
    /// Identifiers submitted
    pub total: usize,
    /// Entries resolved by any path
    pub succeeded: usize,
    /// Entries without a record
    pub failed: usize,
    /// `succeeded / total`, between 0 and 1
    pub success_rate: f64,
    /// Wall-clock time of the whole batch
    pub elapsed_ms: u64,
    /// Mean per-entry lookup time
    pub average_ms: u64,
    /// Entries resolved by the fast path
    pub fast_path: usize,
    /// Entries resolved by the fallback
    pub fallback: usize,
}

/// Per-entry results in input order plus summary
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct BatchReport {
    /// One outcome per submitted identifier, in input order
    pub results: Vec<LookupOutcome>,
    /// Aggregate statistics
    pub summary: BatchSummary,
}

impl BatchReport {
    fn new(results: Vec<LookupOutcome>, elapsed: Duration) -> Self {
        let total = results.len();
        let mut succeeded = 0;
        let mut fast_path = 0;
        let mut lookup_ms_sum: u64 = 0;

        for outcome in &results {
            match outcome {
                LookupOutcome::Success { record } => {
                    succeeded += 1;
                    if record.method.is_fast() {
                        fast_path += 1;
                    }
                    lookup_ms_sum += record.elapsed_ms;
                }
                LookupOutcome::Failure { elapsed_ms, .. } => lookup_ms_sum += elapsed_ms,
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let success_rate = if total == 0 {
            0.0
        } else {
            succeeded as f64 / total as f64
        };

        Self {
            summary: BatchSummary {
                total,
                succeeded,
                failed: total - succeeded,
                success_rate,
                elapsed_ms: millis(elapsed),
                average_ms: lookup_ms_sum.checked_div(total as u64).unwrap_or(0),
                fast_path,
                fallback: succeeded - fast_path,
            },
            results,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

enum FastPath {
    Resolved(Record),
    Skipped,
    Failed(QueryError),
}

/// Facade over the channel pool and the fallback resolver
#[derive(Debug)]
pub struct LookupService<A> {
    pool: Arc<ChannelPool<A>>,
    fallback: FallbackResolver,
    config: LookupConfig,
}

impl<A: Authenticator> LookupService<A> {
    /// Create a new lookup service
    pub fn new(pool: Arc<ChannelPool<A>>, fallback: FallbackResolver, config: LookupConfig) -> Self {
        Self {
            pool,
            fallback,
            config,
        }
    }

    /// The channel pool
    pub fn pool(&self) -> &ChannelPool<A> {
        &self.pool
    }

    /// Service limits
    pub fn config(&self) -> &LookupConfig {
        &self.config
    }

    /// Current pool snapshot
    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Resolve one identifier under the configured deadline
    pub async fn lookup(&self, raw: &str) -> Result<Record, LookupError> {
        self.lookup_with_deadline(raw, self.config.deadline).await
    }

    /// Resolve one identifier under a caller-supplied deadline
    ///
    /// If the deadline elapses while a portal query is in flight the query is
    /// abandoned and its channel retired.
    pub async fn lookup_with_deadline(
        &self,
        raw: &str,
        deadline: Duration,
    ) -> Result<Record, LookupError> {
        let start = Instant::now();
        let identifier = IdentityNumber::parse(raw)?;

        match timeout(deadline, self.resolve(&identifier, start)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(identifier = %identifier.masked(), deadline_ms = millis(deadline), "Lookup deadline elapsed");
                Err(LookupError::Timeout {
                    timeout_ms: millis(deadline),
                })
            }
        }
    }

    /// Resolve one identifier into an outcome, never failing
    pub async fn lookup_outcome(&self, raw: &str) -> LookupOutcome {
        let start = Instant::now();
        match self.lookup(raw).await {
            Ok(record) => LookupOutcome::Success { record },
            Err(e) => LookupOutcome::Failure {
                identifier: raw.to_string(),
                reason: e.reason(),
                message: e.to_string(),
                elapsed_ms: millis(start.elapsed()),
            },
        }
    }

    /// Resolve a batch concurrently, one independent lookup per entry
    ///
    /// Results keep the input order.
    pub async fn lookup_batch(&self, identifiers: &[String]) -> Result<BatchReport, LookupError> {
        if identifiers.is_empty() {
            return Err(LookupError::EmptyBatch);
        }
        if identifiers.len() > self.config.max_batch_size {
            return Err(LookupError::BatchTooLarge {
                size: identifiers.len(),
                max: self.config.max_batch_size,
            });
        }

        let start = Instant::now();
        let results = join_all(identifiers.iter().map(|raw| self.lookup_outcome(raw))).await;
        let report = BatchReport::new(results, start.elapsed());

        info!(
            total = report.summary.total,
            succeeded = report.summary.succeeded,
            fast_path = report.summary.fast_path,
            elapsed_ms = report.summary.elapsed_ms,
            "Batch lookup completed"
        );
        Ok(report)
    }

    async fn resolve(&self, identifier: &IdentityNumber, start: Instant) -> Result<Record, LookupError> {
        let fast_failure = match self.try_fast_path(identifier).await {
            FastPath::Resolved(record) => {
                return Ok(record.with_elapsed_ms(millis(start.elapsed())));
            }
            FastPath::Skipped => None,
            FastPath::Failed(e) => Some(e),
        };

        match self.fallback.resolve(identifier).await {
            Ok(record) => {
                debug!(identifier = %identifier.masked(), method = %record.method, "Resolved through fallback");
                Ok(record.with_elapsed_ms(millis(start.elapsed())))
            }
            Err(e) => {
                let error = LookupError::from_fallback(e, fast_failure);
                if error.reason().is_negative_result() {
                    debug!(identifier = %identifier.masked(), error = %error, "Lookup returned no record");
                } else {
                    warn!(identifier = %identifier.masked(), error = %error, "Lookup failed");
                }
                Err(error)
            }
        }
    }

    async fn try_fast_path(&self, identifier: &IdentityNumber) -> FastPath {
        let Some(mut lease) = self.pool.acquire() else {
            debug!(identifier = %identifier.masked(), "No portal channel available");
            return FastPath::Skipped;
        };

        let channel_id = lease.channel_id();
        let result = lease.query(identifier).await;
        match result {
            Ok(record) => {
                lease.release();
                debug!(channel_id, identifier = %identifier.masked(), "Resolved through portal");
                FastPath::Resolved(record)
            }
            Err(e) => {
                if e.is_session_lost() {
                    lease.mark_failed();
                    warn!(channel_id, error = %e, "Portal session lost, falling back");
                } else {
                    info!(channel_id, error = %e, "Portal query failed, falling back");
                }
                lease.release();
                FastPath::Failed(e)
            }
        }
    }
}
