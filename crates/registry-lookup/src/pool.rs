// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Fixed-size pool of authenticated portal channels
//!
//! The pool owns its channels and hands them out round-robin as
//! [`ChannelLease`]s. Slot states and the cursor live behind one mutex whose
//! critical section covers the scan for a ready slot and its flip to busy, so a
//! channel is never leased twice. The lock is never held across an await.
//!
//! Lifecycle operations ([`ChannelPool::bootstrap`], [`ChannelPool::refresh`],
//! [`ChannelPool::close_all`]) are serialised by a separate async lock, so
//! authentication never runs for several channels at once.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use futures::future::join_all;
use portal_client::Authenticator;
use serde::Serialize;
use shared_types::{IdentityNumber, Record};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::channel::{ChannelConfig, ChannelState, QueryChannel, QueryError};

/// Pool sizing and bootstrap pacing
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of channels
    pub max_sessions: usize,
    /// Pause between consecutive authentications
    pub bootstrap_delay: Duration,
    /// Budget for a single authentication
    pub authentication_timeout: Duration,
    /// Per-channel configuration
    pub channel: ChannelConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_sessions: 3,
            bootstrap_delay: Duration::from_secs(2),
            authentication_timeout: Duration::from_secs(30),
            channel: ChannelConfig::default(),
        }
    }
}

/// Snapshot of the pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct PoolStatus {
    /// Channels in the pool, failed ones included
    pub total: usize,
    /// Channels free for a query
    pub ready: usize,
    /// Channels serving a query
    pub busy: usize,
    /// Channels retired after a session loss
    pub failed: usize,
    /// Incremented every time the channel set is replaced or closed
    pub generation: u64,
    /// Whether the pool has been closed
    pub closed: bool,
}

#[derive(Debug)]
struct Slot {
    channel: Arc<QueryChannel>,
    state: ChannelState,
}

#[derive(Debug, Default)]
struct PoolState {
    slots: Vec<Slot>,
    cursor: usize,
    generation: u64,
    closed: bool,
}

impl PoolState {
    fn status(&self) -> PoolStatus {
        let mut status = PoolStatus {
            total: self.slots.len(),
            generation: self.generation,
            closed: self.closed,
            ..PoolStatus::default()
        };
        for slot in &self.slots {
            match slot.state {
                ChannelState::Ready => status.ready += 1,
                ChannelState::Busy => status.busy += 1,
                ChannelState::Failed => status.failed += 1,
                ChannelState::Unauthenticated | ChannelState::Closed => {}
            }
        }
        status
    }
}

fn lock(state: &Mutex<PoolState>) -> MutexGuard<'_, PoolState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Pool of portal channels sharing one authenticator
#[derive(Debug)]
pub struct ChannelPool<A> {
    authenticator: Arc<A>,
    config: PoolConfig,
    state: Arc<Mutex<PoolState>>,
    lifecycle: tokio::sync::Mutex<()>,
}

impl<A: Authenticator> ChannelPool<A> {
    /// Create an empty pool; call [`ChannelPool::bootstrap`] to fill it
    pub fn new(authenticator: A, config: PoolConfig) -> Self {
        Self {
            authenticator: Arc::new(authenticator),
            config,
            state: Arc::new(Mutex::new(PoolState::default())),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    /// Pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Authenticate up to `n` channels sequentially and install them
    ///
    /// Any channels already in the pool are closed first. Individual failures are
    /// logged and discarded; zero ready channels is a valid outcome meaning the
    /// fast path is unavailable. Returns the number of ready channels.
    pub async fn bootstrap(&self, n: usize) -> usize {
        let _guard = self.lifecycle.lock().await;
        self.close_locked(false).await;
        self.bootstrap_locked(n).await
    }

    /// Close every channel, then bootstrap `max_sessions` fresh ones
    pub async fn refresh(&self) -> usize {
        let _guard = self.lifecycle.lock().await;
        info!("Refreshing portal channel pool");
        self.close_locked(false).await;
        self.bootstrap_locked(self.config.max_sessions).await
    }

    /// Close every channel concurrently and clear the pool
    ///
    /// Idempotent; leases still out are released as no-ops.
    pub async fn close_all(&self) {
        let _guard = self.lifecycle.lock().await;
        self.close_locked(true).await;
    }

    /// Lease the next ready channel in round-robin order
    ///
    /// Returns `None` when the pool is empty, closed, or every channel is busy
    /// or failed.
    pub fn acquire(&self) -> Option<ChannelLease> {
        let mut state = lock(&self.state);
        if state.closed || state.slots.is_empty() {
            return None;
        }

        let len = state.slots.len();
        let start = state.cursor;
        for step in 0..len {
            let index = (start + step) % len;
            if state.slots[index].state == ChannelState::Ready {
                state.slots[index].state = ChannelState::Busy;
                state.cursor = (index + 1) % len;
                return Some(ChannelLease {
                    channel: Arc::clone(&state.slots[index].channel),
                    slot: index,
                    generation: state.generation,
                    pool: Arc::clone(&self.state),
                    failed: false,
                    in_flight: false,
                    released: false,
                });
            }
        }

        state.cursor = (start + 1) % len;
        None
    }

    /// Return a leased channel to the pool
    pub fn release(&self, lease: ChannelLease) {
        lease.release();
    }

    /// Snapshot of channel counts
    pub fn status(&self) -> PoolStatus {
        lock(&self.state).status()
    }

    /// Whether the pool currently has no channels at all
    pub fn is_empty(&self) -> bool {
        lock(&self.state).slots.is_empty()
    }

    async fn bootstrap_locked(&self, n: usize) -> usize {
        let requested = n.min(self.config.max_sessions);
        let budget = self.config.authentication_timeout;
        let mut channels = Vec::with_capacity(requested);

        info!(requested, "Bootstrapping portal channels");
        for id in 0..requested {
            if id > 0 && !self.config.bootstrap_delay.is_zero() {
                sleep(self.config.bootstrap_delay).await;
            }

            let mut channel = QueryChannel::new(id, self.config.channel.clone());
            match timeout(budget, channel.authenticate(self.authenticator.as_ref())).await {
                Ok(Ok(())) => channels.push(channel),
                Ok(Err(e)) => warn!(channel_id = id, error = %e, "Portal channel authentication failed"),
                Err(_) => warn!(
                    channel_id = id,
                    timeout_seconds = budget.as_secs(),
                    "Portal channel authentication timed out"
                ),
            }
        }

        let ready = channels.len();
        let mut state = lock(&self.state);
        state.slots = channels
            .into_iter()
            .map(|channel| Slot {
                channel: Arc::new(channel),
                state: ChannelState::Ready,
            })
            .collect();
        state.cursor = 0;
        state.closed = false;
        state.generation += 1;

        if ready == 0 {
            warn!(requested, "No portal channels ready, fast path unavailable");
        } else {
            info!(ready, requested, generation = state.generation, "Portal channel pool ready");
        }
        ready
    }

    /// Retire every channel; `shutdown` marks the pool closed until the next bootstrap
    async fn close_locked(&self, shutdown: bool) {
        let channels: Vec<Arc<QueryChannel>> = {
            let mut state = lock(&self.state);
            if shutdown {
                state.closed = true;
            }
            if !state.slots.is_empty() {
                state.generation += 1;
            }
            for slot in &mut state.slots {
                slot.state = ChannelState::Closed;
            }
            state.cursor = 0;
            state.slots.drain(..).map(|slot| slot.channel).collect()
        };

        if channels.is_empty() {
            return;
        }

        let count = channels.len();
        let authenticator = self.authenticator.as_ref();
        join_all(channels.iter().map(|channel| channel.close(authenticator))).await;
        info!(count, "Closed portal channels");
    }
}

/// Exclusive use of one pool channel
///
/// The slot goes back to `Ready` when the lease is released or dropped, or to
/// `Failed` if [`ChannelLease::mark_failed`] was called. A lease dropped while a
/// query is still in flight, for example because the caller's deadline elapsed,
/// also retires the channel since its session state is unknown.
#[derive(Debug)]
pub struct ChannelLease {
    channel: Arc<QueryChannel>,
    slot: usize,
    generation: u64,
    pool: Arc<Mutex<PoolState>>,
    failed: bool,
    in_flight: bool,
    released: bool,
}

impl ChannelLease {
    /// Identifier of the leased channel
    pub fn channel_id(&self) -> usize {
        self.channel.id()
    }

    /// Run one fast-path query on the leased channel
    pub async fn query(&mut self, identifier: &IdentityNumber) -> Result<Record, QueryError> {
        self.in_flight = true;
        let result = self.channel.query(identifier).await;
        self.in_flight = false;
        result
    }

    /// Retire the channel on release
    pub fn mark_failed(&mut self) {
        self.failed = true;
    }

    /// Return the channel to the pool
    pub fn release(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let retire = self.failed || self.in_flight;
        let mut state = lock(&self.pool);
        if state.generation != self.generation {
            return;
        }
        if let Some(slot) = state.slots.get_mut(self.slot)
            && slot.state == ChannelState::Busy
        {
            slot.state = if retire {
                ChannelState::Failed
            } else {
                ChannelState::Ready
            };
        }
        drop(state);

        if retire {
            warn!(channel_id = self.channel.id(), "Portal channel retired");
        } else {
            debug!(channel_id = self.channel.id(), "Portal channel released");
        }
    }
}

impl Drop for ChannelLease {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::{BTreeMap, HashSet},
        sync::atomic::{AtomicUsize, Ordering},
    };

    use portal_client::{AuthError, Credentials};

    use super::*;

    /// Fails the attempts listed in `fail_on`, counting calls
    #[derive(Debug, Default)]
    struct CountingAuthenticator {
        calls: AtomicUsize,
        releases: AtomicUsize,
        fail_on: Vec<usize>,
        delay: Duration,
    }

    impl Authenticator for CountingAuthenticator {
        async fn authenticate(&self) -> Result<Credentials, AuthError> {
            let attempt = self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
            if self.fail_on.contains(&attempt) {
                return Err(AuthError::Rejected {
                    message: format!("attempt {attempt}"),
                });
            }
            let cookies = BTreeMap::from([("JSESSIONID".to_string(), format!("s{attempt}"))]);
            Ok(Credentials::new(cookies, Some("vs".to_string())))
        }

        async fn release(&self, _credentials: &Credentials) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    fn config(max_sessions: usize) -> PoolConfig {
        PoolConfig {
            max_sessions,
            bootstrap_delay: Duration::ZERO,
            authentication_timeout: Duration::from_secs(1),
            channel: ChannelConfig::default(),
        }
    }

    #[tokio::test]
    async fn bootstrap_discards_failures() {
        let authenticator = CountingAuthenticator {
            fail_on: vec![1],
            ..Default::default()
        };
        let pool = ChannelPool::new(authenticator, config(3));

        assert_eq!(pool.bootstrap(3).await, 2);
        let status = pool.status();
        assert_eq!(status.total, 2);
        assert_eq!(status.ready, 2);
        assert_eq!(status.generation, 1);
        assert!(!status.closed);
    }

    #[tokio::test]
    async fn pool_is_not_closed_while_bootstrapping() {
        let authenticator = CountingAuthenticator {
            delay: Duration::from_millis(300),
            ..Default::default()
        };
        let pool = Arc::new(ChannelPool::new(authenticator, config(1)));

        let bootstrap = tokio::spawn({
            let pool = Arc::clone(&pool);
            async move { pool.bootstrap(1).await }
        });
        sleep(Duration::from_millis(100)).await;

        let status = pool.status();
        assert!(!status.closed);
        assert_eq!(status.total, 0);

        assert_eq!(bootstrap.await.unwrap(), 1);
        assert!(!pool.status().closed);
    }

    #[tokio::test]
    async fn refresh_keeps_pool_open() {
        let authenticator = CountingAuthenticator {
            delay: Duration::from_millis(300),
            ..Default::default()
        };
        let pool = Arc::new(ChannelPool::new(authenticator, config(1)));
        pool.bootstrap(1).await;

        let refresh = tokio::spawn({
            let pool = Arc::clone(&pool);
            async move { pool.refresh().await }
        });
        sleep(Duration::from_millis(100)).await;
        assert!(!pool.status().closed);

        assert_eq!(refresh.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn bootstrap_caps_at_max_sessions() {
        let pool = ChannelPool::new(CountingAuthenticator::default(), config(2));
        assert_eq!(pool.bootstrap(5).await, 2);
        assert_eq!(pool.authenticator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn all_failures_leave_empty_pool() {
        let authenticator = CountingAuthenticator {
            fail_on: vec![0, 1],
            ..Default::default()
        };
        let pool = ChannelPool::new(authenticator, config(2));

        assert_eq!(pool.bootstrap(2).await, 0);
        assert!(pool.is_empty());
        assert!(pool.acquire().is_none());
    }

    #[tokio::test]
    async fn acquire_is_exclusive_and_round_robin() {
        let pool = ChannelPool::new(CountingAuthenticator::default(), config(3));
        pool.bootstrap(3).await;

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        let c = pool.acquire().unwrap();
        let ids: HashSet<usize> = [a.channel_id(), b.channel_id(), c.channel_id()].into();
        assert_eq!(ids.len(), 3);
        assert!(pool.acquire().is_none());
        assert_eq!(pool.status().busy, 3);

        pool.release(b);
        let again = pool.acquire().unwrap();
        assert_eq!(again.channel_id(), 1);

        drop(a);
        drop(c);
        drop(again);
        assert_eq!(pool.status().ready, 3);

        // Cursor moved past slot 1, so the next lease is slot 2
        assert_eq!(pool.acquire().unwrap().channel_id(), 2);
    }

    #[tokio::test]
    async fn concurrent_acquires_never_share_a_channel() {
        let pool = Arc::new(ChannelPool::new(CountingAuthenticator::default(), config(3)));
        pool.bootstrap(3).await;

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let pool = Arc::clone(&pool);
                tokio::spawn(async move { pool.acquire().map(|lease| (lease.channel_id(), lease)) })
            })
            .collect();

        let mut leases = Vec::new();
        for handle in handles {
            leases.push(handle.await.unwrap().unwrap());
        }
        let ids: HashSet<usize> = leases.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids.len(), 3);
    }

    #[tokio::test]
    async fn marked_lease_retires_channel() {
        let pool = ChannelPool::new(CountingAuthenticator::default(), config(1));
        pool.bootstrap(1).await;

        let mut lease = pool.acquire().unwrap();
        lease.mark_failed();
        pool.release(lease);

        let status = pool.status();
        assert_eq!(status.failed, 1);
        assert_eq!(status.total, 1);
        assert!(pool.acquire().is_none());
    }

    #[tokio::test]
    async fn abandoned_in_flight_lease_retires_channel() {
        let pool = ChannelPool::new(CountingAuthenticator::default(), config(1));
        pool.bootstrap(1).await;

        let mut lease = pool.acquire().unwrap();
        lease.in_flight = true;
        drop(lease);

        assert_eq!(pool.status().failed, 1);
    }

    #[tokio::test]
    async fn close_all_is_idempotent_and_ignores_stale_leases() {
        let pool = ChannelPool::new(CountingAuthenticator::default(), config(2));
        pool.bootstrap(2).await;
        let lease = pool.acquire().unwrap();

        pool.close_all().await;
        pool.close_all().await;
        assert_eq!(pool.authenticator.releases.load(Ordering::SeqCst), 2);

        drop(lease);
        let status = pool.status();
        assert_eq!(status.total, 0);
        assert!(status.closed);
        assert!(pool.acquire().is_none());
    }

    #[tokio::test]
    async fn refresh_replaces_channels() {
        let pool = ChannelPool::new(CountingAuthenticator::default(), config(2));
        pool.bootstrap(2).await;
        let mut lease = pool.acquire().unwrap();
        lease.mark_failed();
        drop(lease);
        assert_eq!(pool.status().failed, 1);

        assert_eq!(pool.refresh().await, 2);
        let status = pool.status();
        assert_eq!(status.ready, 2);
        assert_eq!(status.failed, 0);
        assert!(status.generation > 1);
        assert_eq!(pool.authenticator.calls.load(Ordering::SeqCst), 4);
    }
}
