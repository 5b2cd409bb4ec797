// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-session token-bucket rate limiting with lazy refill and a
//! cooperative background reaper, the same shutdown pattern the teacher
//! uses for its connection's background read loop
//! (`client::client::ClientConnection`): a `CancellationToken` raced
//! against a sleep in a `tokio::select!`, so the task exits promptly on
//! shutdown instead of waiting out its last sleep.

use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{errors::DispatchError, ids::SessionId};

/// Capability that exempts a subject from rate limiting, checked via the
/// authorization interface.
pub const BYPASS_CAPABILITY: &str = "admin.ratelimit.bypass";

const DEFAULT_BURST: f64 = 10.0;
const DEFAULT_RATE_PER_SEC: f64 = 2.0;
const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_SESSION_MAX_AGE: Duration = Duration::from_secs(60 * 60);

pub const MIN_BURST: f64 = 1.0;
pub const MIN_RATE_PER_SEC: f64 = 0.1;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
    last_used: Instant,
}

/// Token-bucket limits, one bucket per session.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Maximum tokens a bucket can hold.
    pub capacity: f64,
    /// Tokens added per second.
    pub refill_per_sec: f64,
    /// How often the reaper sweeps for idle buckets.
    pub reap_interval: Duration,
    /// A bucket untouched for this long is dropped by the reaper.
    pub idle_ttl: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_BURST,
            refill_per_sec: DEFAULT_RATE_PER_SEC,
            reap_interval: DEFAULT_CLEANUP_INTERVAL,
            idle_ttl: DEFAULT_SESSION_MAX_AGE,
        }
    }
}

impl RateLimitConfig {
    /// Clamps configured values to their documented floors (burst >= 1,
    /// rate >= 0.1/s) so a misconfigured server degrades gracefully
    /// instead of admitting an unbounded burst or never refilling.
    fn clamp_floors(mut self) -> Self {
        self.capacity = self.capacity.max(MIN_BURST);
        self.refill_per_sec = self.refill_per_sec.max(MIN_RATE_PER_SEC);
        self
    }
}

pub struct RateLimiter {
    buckets: DashMap<SessionId, Bucket>,
    config: RateLimitConfig,
    cancel: CancellationToken,
    reaper: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl RateLimiter {
    /// Builds a limiter and spawns its background reaper task.
    pub fn spawn(config: RateLimitConfig) -> Arc<Self> {
        let config = config.clamp_floors();
        let limiter = Arc::new(Self {
            buckets: DashMap::new(),
            config,
            cancel: CancellationToken::new(),
            reaper: std::sync::Mutex::new(None),
        });

        let weak = Arc::downgrade(&limiter);
        let cancel = limiter.cancel.clone();
        let interval = config.reap_interval;
        let idle_ttl = config.idle_ttl;
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("rate limiter reaper shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        let Some(limiter) = weak.upgrade() else { break };
                        limiter.reap(idle_ttl);
                    }
                }
            }
        });
        *limiter.reaper.lock().expect("reaper mutex poisoned") = Some(handle);
        limiter
    }

    /// Attempts to consume one token for `session`. Returns
    /// [`DispatchError::RateLimited`] with an estimated cooldown when the
    /// bucket is empty.
    pub fn allow(&self, session: SessionId) -> Result<(), DispatchError> {
        let now = Instant::now();
        let mut bucket = self.buckets.entry(session).or_insert_with(|| Bucket {
            tokens: self.config.capacity,
            last_refill: now,
            last_used: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.config.refill_per_sec)
            .min(self.config.capacity);
        bucket.last_refill = now;
        bucket.last_used = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return Ok(());
        }

        let deficit = 1.0 - bucket.tokens;
        let cooldown_secs = deficit / self.config.refill_per_sec;
        let cooldown_ms = (cooldown_secs * 1000.0).ceil().max(0.0) as u64;
        Err(DispatchError::RateLimited { cooldown_ms })
    }

    fn reap(&self, idle_ttl: Duration) {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_used) < idle_ttl);
        let removed = before - self.buckets.len();
        if removed > 0 {
            debug!(removed, "rate limiter reaper evicted idle buckets");
        }
    }

    /// Idempotent shutdown: cancels the reaper and awaits its join
    /// handle. Safe to call more than once or concurrently with ongoing
    /// `allow` calls -- the bucket map keeps working, only the reaper
    /// task stops.
    pub async fn close(&self) {
        self.cancel.cancel();
        let handle = self
            .reaper
            .lock()
            .expect("reaper mutex poisoned")
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> RateLimitConfig {
        RateLimitConfig {
            capacity: 2.0,
            refill_per_sec: 1.0,
            reap_interval: Duration::from_secs(3600),
            idle_ttl: Duration::from_secs(3600),
        }
    }

    #[tokio::test]
    async fn allows_up_to_capacity_then_rejects() {
        let limiter = RateLimiter::spawn(test_config());
        let session = SessionId::new();
        assert!(limiter.allow(session).is_ok());
        assert!(limiter.allow(session).is_ok());
        let err = limiter.allow(session).unwrap_err();
        assert!(matches!(err, DispatchError::RateLimited { .. }));
        limiter.close().await;
    }

    #[tokio::test]
    async fn distinct_sessions_have_independent_buckets() {
        let limiter = RateLimiter::spawn(test_config());
        let a = SessionId::new();
        let b = SessionId::new();
        assert!(limiter.allow(a).is_ok());
        assert!(limiter.allow(a).is_ok());
        assert!(limiter.allow(a).is_err());
        assert!(limiter.allow(b).is_ok());
        limiter.close().await;
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let limiter = RateLimiter::spawn(test_config());
        limiter.close().await;
        limiter.close().await;
    }
}
