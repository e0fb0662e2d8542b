//! Per-identity request rate limiting.
//!
//! Buckets are keyed by `(identity key, resource class)` and live in a
//! sharded map. Each decision is made while holding the write guard of the
//! bucket's shard, so concurrent callers never lose an increment.
//!
//! The first call after a window boundary sweeps out buckets that would
//! behave exactly like fresh ones, so the map only holds keys seen within
//! roughly the last window.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;

use crate::clock::{system_clock, SharedClock};
use crate::config::{RateLimitAlgorithm, RateLimitConfig};
use crate::error::{AuthError, AuthResult};

#[derive(Debug, Clone, Copy)]
enum Bucket {
    Window { index: u64, count: u32 },
    /// `credit` is measured in `1 / window_ms` of a token, which keeps
    /// refill and wait arithmetic in integers.
    Tokens { credit: u64, last_refill_ms: u64 },
}

impl Bucket {
    fn new(algorithm: RateLimitAlgorithm, limit: u32, now_ms: u64, window_ms: u64) -> Self {
        match algorithm {
            RateLimitAlgorithm::FixedWindow => Bucket::Window {
                index: now_ms / window_ms,
                count: 0,
            },
            RateLimitAlgorithm::TokenBucket => Bucket::Tokens {
                credit: u64::from(limit).saturating_mul(window_ms),
                last_refill_ms: now_ms,
            },
        }
    }

    /// Consume one unit, or return the wait until one is available.
    fn try_acquire(&mut self, limit: u32, now_ms: u64, window_ms: u64) -> Result<(), u64> {
        match self {
            Bucket::Window { index, count } => {
                let current = now_ms / window_ms;
                if *index != current {
                    *index = current;
                    *count = 0;
                }
                if *count < limit {
                    *count += 1;
                    Ok(())
                } else {
                    Err((current + 1) * window_ms - now_ms)
                }
            }
            Bucket::Tokens {
                credit,
                last_refill_ms,
            } => {
                if limit == 0 {
                    return Err(window_ms);
                }
                let rate = u64::from(limit);
                let elapsed = now_ms.saturating_sub(*last_refill_ms);
                *credit = credit
                    .saturating_add(elapsed.saturating_mul(rate))
                    .min(rate.saturating_mul(window_ms));
                *last_refill_ms = now_ms;

                // One token is worth `window_ms` credit.
                if *credit >= window_ms {
                    *credit -= window_ms;
                    Ok(())
                } else {
                    Err((window_ms - *credit).div_ceil(rate))
                }
            }
        }
    }

    /// Whether the bucket holds no information beyond a fresh one.
    fn is_idle(&self, limit: u32, now_ms: u64, window_ms: u64) -> bool {
        match *self {
            Bucket::Window { index, .. } => index < now_ms / window_ms,
            Bucket::Tokens {
                credit,
                last_refill_ms,
            } => {
                let rate = u64::from(limit);
                let elapsed = now_ms.saturating_sub(last_refill_ms);
                credit.saturating_add(elapsed.saturating_mul(rate))
                    >= rate.saturating_mul(window_ms)
            }
        }
    }
}

/// Bounds the request rate per identity and resource class.
pub struct RateLimiter {
    buckets: DashMap<(String, String), Bucket>,
    config: RateLimitConfig,
    window_ms: u64,
    swept_window: AtomicU64,
    clock: SharedClock,
}

impl RateLimiter {
    /// Create a rate limiter.
    pub fn new(config: RateLimitConfig) -> AuthResult<Self> {
        config.validate()?;
        let window_ms = u64::try_from(config.window.as_millis())
            .map_err(|_| AuthError::InvalidInput("rate limit window too large".into()))?;

        Ok(Self {
            buckets: DashMap::new(),
            config,
            window_ms,
            swept_window: AtomicU64::new(0),
            clock: system_clock(),
        })
    }

    /// Replace the clock used for window arithmetic.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Record one request and decide whether it is within budget.
    pub fn allow(&self, identity_key: &str, resource_class: &str) -> AuthResult<()> {
        let limit = self.config.limit_for(resource_class);
        let now_ms = self.now_ms();
        let algorithm = self.config.algorithm;
        let window_ms = self.window_ms;
        self.sweep_on_new_window(now_ms);

        let decision = {
            let mut bucket = self
                .buckets
                .entry((identity_key.to_string(), resource_class.to_string()))
                .or_insert_with(|| Bucket::new(algorithm, limit, now_ms, window_ms));
            bucket.try_acquire(limit, now_ms, window_ms)
        };

        decision.map_err(|wait_ms| {
            tracing::debug!(
                identity = %identity_key,
                resource_class = %resource_class,
                limit,
                retry_after_ms = wait_ms,
                "rate limit exceeded"
            );
            AuthError::RateLimitExceeded {
                resource_class: resource_class.to_string(),
                retry_after: Duration::from_millis(wait_ms),
            }
        })
    }

    /// Number of buckets currently held.
    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }

    /// Drop buckets that would behave exactly like fresh ones.
    ///
    /// Returns the number of buckets removed.
    pub fn purge_idle(&self) -> usize {
        self.purge_at(self.now_ms())
    }

    fn purge_at(&self, now_ms: u64) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|(_, class), bucket| {
            !bucket.is_idle(self.config.limit_for(class), now_ms, self.window_ms)
        });
        before.saturating_sub(self.buckets.len())
    }

    /// Purge once per window, on the first call that sees the new index.
    ///
    /// Must be called without holding any bucket guard.
    fn sweep_on_new_window(&self, now_ms: u64) {
        let current = now_ms / self.window_ms;
        let swept = self.swept_window.load(Ordering::Acquire);
        if current <= swept {
            return;
        }
        if self
            .swept_window
            .compare_exchange(swept, current, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let removed = self.purge_at(now_ms);
            if removed > 0 {
                tracing::debug!(
                    removed,
                    remaining = self.buckets.len(),
                    "idle rate limit buckets purged"
                );
            }
        }
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.clock.now().as_millis()).unwrap_or(u64::MAX)
    }
}
