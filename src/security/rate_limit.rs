//! Fixed-window rate limiting per client.
//!
//! Each client key owns a window `{window_start, count}`. A window is replaced
//! once `now - window_start >= window`; within a window at most
//! `max_requests` requests are admitted. The boundary is a hard cutoff, so a
//! client may burst again as soon as its window rolls over.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;

use crate::clock::{Clock, Millis, SharedClock};
use crate::config::RateLimitConfig;
use crate::lifecycle::ShutdownSignal;

/// Key used to partition rate-limit state. Not an authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Counter state for one client within one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    pub window_start: Millis,
    pub count: u32,
}

/// Outcome of a single [`WindowStore::hit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    /// Window state after the hit.
    pub window: RateWindow,
    /// Whether this hit was counted.
    pub admitted: bool,
}

/// Storage for rate windows.
///
/// `hit` must be atomic per key: two concurrent hits on the same key must
/// never both observe room in the window when only one slot is left.
pub trait WindowStore: Send + Sync {
    fn hit(&self, key: &ClientKey, now: Millis, window: Millis, max_requests: u32) -> Hit;

    /// Drop windows that ended before `now`. Returns how many were removed.
    fn purge_expired(&self, now: Millis, window: Millis) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-process window table. Per-key updates run under the shard lock held by
/// `DashMap::entry`, which makes read-increment-compare atomic per key.
#[derive(Debug, Default)]
pub struct MemoryWindowStore {
    windows: DashMap<ClientKey, RateWindow>,
}

impl MemoryWindowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WindowStore for MemoryWindowStore {
    fn hit(&self, key: &ClientKey, now: Millis, window: Millis, max_requests: u32) -> Hit {
        let mut entry = self
            .windows
            .entry(key.clone())
            .or_insert(RateWindow { window_start: now, count: 0 });

        if now.saturating_sub(entry.window_start) >= window {
            *entry = RateWindow { window_start: now, count: 0 };
        }

        let admitted = entry.count < max_requests;
        if admitted {
            entry.count += 1;
        }

        Hit {
            window: *entry,
            admitted,
        }
    }

    fn purge_expired(&self, now: Millis, window: Millis) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.saturating_sub(w.window_start) < window);
        before.saturating_sub(self.windows.len())
    }

    fn len(&self) -> usize {
        self.windows.len()
    }
}

/// A rejected request, with how long until the client's window resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("rate limit exceeded, retry in {retry_after:?}")]
pub struct RateLimitExceeded {
    pub retry_after: Duration,
}

/// Quota snapshot for one request, used for response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub admitted: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the current window ends.
    pub reset_after: Duration,
}

impl RateDecision {
    pub fn into_result(self) -> Result<RateDecision, RateLimitExceeded> {
        if self.admitted {
            Ok(self)
        } else {
            Err(RateLimitExceeded {
                retry_after: self.reset_after,
            })
        }
    }
}

/// Whole seconds a client should wait, rounded up and never zero.
pub fn retry_after_secs(d: Duration) -> u64 {
    let secs = d.as_millis().div_ceil(1000) as u64;
    secs.max(1)
}

/// Fixed-window limiter over a [`WindowStore`].
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn WindowStore>,
    clock: SharedClock,
    window: Duration,
    max_requests: u32,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn WindowStore>,
        clock: SharedClock,
        window: Duration,
        max_requests: u32,
    ) -> Self {
        Self {
            store,
            clock,
            window,
            max_requests,
        }
    }

    pub fn from_config(
        config: &RateLimitConfig,
        store: Arc<dyn WindowStore>,
        clock: SharedClock,
    ) -> Self {
        Self::new(
            store,
            clock,
            Duration::from_millis(config.window_ms),
            config.max_requests,
        )
    }

    /// Count a request from `key` and report whether it is admitted.
    pub fn admit(&self, key: &ClientKey) -> bool {
        self.check(key).admitted
    }

    /// Count a request from `key` and return the full quota snapshot.
    pub fn check(&self, key: &ClientKey) -> RateDecision {
        let now = self.clock.now_ms();
        let window_ms = self.window.as_millis() as Millis;
        let hit = self.store.hit(key, now, window_ms, self.max_requests);

        let window_end = hit.window.window_start + window_ms;
        RateDecision {
            admitted: hit.admitted,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(hit.window.count),
            reset_after: Duration::from_millis(window_end.saturating_sub(now)),
        }
    }

    /// Remove windows that have already ended.
    pub fn purge_expired(&self) -> usize {
        self.store
            .purge_expired(self.clock.now_ms(), self.window.as_millis() as Millis)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn tracked_clients(&self) -> usize {
        self.store.len()
    }
}

/// Periodically purge expired windows until `shutdown` fires.
pub async fn run_sweeper(limiter: RateLimiter, interval: Duration, mut shutdown: ShutdownSignal) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = limiter.purge_expired();
                if removed > 0 {
                    tracing::debug!(
                        removed,
                        remaining = limiter.tracked_clients(),
                        "Purged expired rate windows"
                    );
                }
            }
            _ = shutdown.recv() => {
                tracing::debug!("Rate window sweeper stopping");
                break;
            }
        }
    }
}
