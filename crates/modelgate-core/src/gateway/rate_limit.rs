//! Fixed-window per-key rate limiter.
//!
//! One bucket per (endpoint-class, caller-key). A bucket past its window
//! end is logically expired and replaced wholesale, never mutated.
//! Correctness depends only on the expiry check at lookup time; the
//! periodic sweep merely bounds memory growth.

use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use dashmap::DashMap;

use crate::config::{RateLimitPolicy, MIN_WINDOW};

/// How often the lazy sweep is allowed to run.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct RateBucket {
    window_ends_at: SystemTime,
    remaining: u32,
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateDecision {
    Allowed {
        remaining: u32,
        reset_at: SystemTime,
    },
    Limited {
        reset_at: SystemTime,
        retry_after_seconds: u64,
    },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }

    pub fn reset_at(&self) -> SystemTime {
        match self {
            RateDecision::Allowed { reset_at, .. } | RateDecision::Limited { reset_at, .. } => {
                *reset_at
            }
        }
    }

    /// Window end as epoch seconds, for the `X-RateLimit-Reset` header.
    pub fn reset_epoch_seconds(&self) -> i64 {
        chrono::DateTime::<chrono::Utc>::from(self.reset_at()).timestamp()
    }
}

/// Process-wide fixed-window counter. Injected into the gateway at
/// construction so tests get an isolated instance; per-process only, not
/// a globally consistent limiter.
pub struct RateLimiter {
    buckets: DashMap<String, RateBucket>,
    last_sweep: Mutex<SystemTime>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
            last_sweep: Mutex::new(SystemTime::UNIX_EPOCH),
        }
    }

    /// Check and consume one slot for `key` under `policy` at time `now`.
    ///
    /// `now` is explicit so tests drive the clock. The policy is clamped
    /// again here in case a caller built one by hand.
    pub fn check(&self, key: &str, policy: RateLimitPolicy, now: SystemTime) -> RateDecision {
        let window = policy.window.max(MIN_WINDOW);
        let max_count = policy.max_count.max(1);

        self.sweep_if_due(now);

        let mut entry = self.buckets.entry(key.to_string()).or_insert_with(|| RateBucket {
            window_ends_at: now + window,
            remaining: max_count,
        });

        // Expired bucket: replace, never reuse.
        if now >= entry.window_ends_at {
            *entry = RateBucket {
                window_ends_at: now + window,
                remaining: max_count,
            };
        }

        if entry.remaining == 0 {
            let reset_at = entry.window_ends_at;
            drop(entry);
            let retry_after_seconds = duration_to_secs_ceil(
                reset_at.duration_since(now).unwrap_or(Duration::ZERO),
            )
            .max(1);
            tracing::warn!(key, retry_after_seconds, "rate limit exceeded");
            return RateDecision::Limited { reset_at, retry_after_seconds };
        }

        entry.remaining -= 1;
        let decision = RateDecision::Allowed {
            remaining: entry.remaining,
            reset_at: entry.window_ends_at,
        };
        drop(entry);
        decision
    }

    /// Opportunistic cleanup of expired buckets, rate-limited to one pass
    /// per [`SWEEP_INTERVAL`]. Best-effort only.
    fn sweep_if_due(&self, now: SystemTime) {
        let Ok(mut last) = self.last_sweep.try_lock() else {
            return;
        };
        let due = now
            .duration_since(*last)
            .map(|elapsed| elapsed >= SWEEP_INTERVAL)
            .unwrap_or(false);
        if !due {
            return;
        }
        *last = now;
        drop(last);

        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| bucket.window_ends_at > now);
        let removed = before.saturating_sub(self.buckets.len());
        if removed > 0 {
            tracing::debug!(removed, "swept expired rate buckets");
        }
    }

    #[cfg(test)]
    fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

fn duration_to_secs_ceil(d: Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(window_ms: u64, max: u32) -> RateLimitPolicy {
        RateLimitPolicy::clamped(Duration::from_millis(window_ms), max)
    }

    #[test]
    fn test_burst_then_recovery() {
        let limiter = RateLimiter::new();
        let p = policy(60_000, 3);
        let t0 = SystemTime::now();

        for expected in [2, 1, 0] {
            match limiter.check("ip:1.2.3.4", p, t0) {
                RateDecision::Allowed { remaining, .. } => assert_eq!(remaining, expected),
                RateDecision::Limited { .. } => panic!("call should be allowed"),
            }
        }

        match limiter.check("ip:1.2.3.4", p, t0) {
            RateDecision::Limited { retry_after_seconds, .. } => {
                assert!(retry_after_seconds >= 1);
            }
            RateDecision::Allowed { .. } => panic!("4th call must be limited"),
        }

        // 61 seconds later the window has reset.
        let t1 = t0 + Duration::from_secs(61);
        match limiter.check("ip:1.2.3.4", p, t1) {
            RateDecision::Allowed { remaining, .. } => assert_eq!(remaining, 2),
            RateDecision::Limited { .. } => panic!("fresh window must admit"),
        }
    }

    #[test]
    fn test_remaining_never_negative_and_denials_hold() {
        let limiter = RateLimiter::new();
        let p = policy(60_000, 2);
        let t0 = SystemTime::now();

        let mut seen_zero = false;
        for _ in 0..10 {
            match limiter.check("k", p, t0) {
                RateDecision::Allowed { remaining, .. } => {
                    assert!(!seen_zero, "no admissions after exhaustion within the window");
                    if remaining == 0 {
                        seen_zero = true;
                    }
                }
                RateDecision::Limited { .. } => {
                    assert!(seen_zero);
                }
            }
        }
    }

    #[test]
    fn test_window_reset_regardless_of_prior_state() {
        let limiter = RateLimiter::new();
        let p = policy(1_000, 5);
        let t0 = SystemTime::now();

        for _ in 0..5 {
            assert!(limiter.check("k", p, t0).is_allowed());
        }
        assert!(!limiter.check("k", p, t0).is_allowed());

        let t1 = t0 + Duration::from_secs(2);
        match limiter.check("k", p, t1) {
            RateDecision::Allowed { remaining, .. } => assert_eq!(remaining, 4),
            RateDecision::Limited { .. } => panic!("expired bucket must be replaced"),
        }
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new();
        let p = policy(60_000, 1);
        let t0 = SystemTime::now();

        assert!(limiter.check("user:1", p, t0).is_allowed());
        assert!(!limiter.check("user:1", p, t0).is_allowed());
        assert!(limiter.check("user:2", p, t0).is_allowed());
    }

    #[test]
    fn test_retry_after_minimum_one_second() {
        let limiter = RateLimiter::new();
        let p = policy(250, 1);
        let t0 = SystemTime::now();

        assert!(limiter.check("k", p, t0).is_allowed());
        // 1ms before the window ends: ceil still reports at least 1s.
        let late = t0 + Duration::from_millis(249);
        match limiter.check("k", p, late) {
            RateDecision::Limited { retry_after_seconds, .. } => {
                assert_eq!(retry_after_seconds, 1);
            }
            RateDecision::Allowed { .. } => panic!("window not yet expired"),
        }
    }

    #[test]
    fn test_sweep_drops_expired_buckets() {
        let limiter = RateLimiter::new();
        let p = policy(1_000, 1);
        let t0 = SystemTime::now();

        for i in 0..50 {
            limiter.check(&format!("k{}", i), p, t0);
        }
        assert_eq!(limiter.bucket_count(), 50);

        // All buckets expired; next check past the sweep interval cleans up.
        let t1 = t0 + Duration::from_secs(120);
        limiter.check("fresh", p, t1);
        assert_eq!(limiter.bucket_count(), 1);
    }
}
