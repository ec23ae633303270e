//! A keyed fixed-window rate limiter (§4.8).
//!
//! Key derivation (forwarded client IP, falling back to a bearer-token
//! suffix or user-agent prefix) is the caller's concern — this limiter
//! only ever sees the already-derived `(scope, key)` pair.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Past this many tracked buckets, [`RateLimiter::check`] opportunistically
/// sweeps expired entries before inserting a new one (§4.8).
const GC_THRESHOLD: usize = 2000;

/// Per-scope admission limit.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitConfig {
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self { max_requests, window }
    }
}

struct Bucket {
    count: u32,
    reset_at: Instant,
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitResult {
    Allowed,
    Denied { retry_after: Duration },
}

impl RateLimitResult {
    #[must_use]
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Fixed-window `(scope, key) -> (count, resetAt)` admission tracker.
#[derive(Default)]
pub struct RateLimiter {
    buckets: DashMap<(String, String), Bucket>,
}

impl RateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit or deny one request against `(scope, key)`.
    ///
    /// On admission the bucket's count is incremented (opening a fresh
    /// window first if the previous one expired). On exhaustion the
    /// caller gets back how long until the window resets, for a
    /// `retry-after` header.
    pub fn check(&self, scope: &str, key: &str, config: RateLimitConfig) -> RateLimitResult {
        if self.buckets.len() > GC_THRESHOLD {
            self.gc();
        }

        let now = Instant::now();
        let entry_key = (scope.to_string(), key.to_string());
        let mut bucket = self.buckets.entry(entry_key).or_insert_with(|| Bucket { count: 0, reset_at: now + config.window });

        if bucket.reset_at <= now {
            bucket.count = 0;
            bucket.reset_at = now + config.window;
        }

        if bucket.count >= config.max_requests {
            return RateLimitResult::Denied { retry_after: bucket.reset_at.saturating_duration_since(now) };
        }

        bucket.count += 1;
        RateLimitResult::Allowed
    }

    fn gc(&self) {
        let now = Instant::now();
        self.buckets.retain(|_, bucket| bucket.reset_at > now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_the_configured_max_then_denies() {
        let limiter = RateLimiter::new();
        let config = RateLimitConfig::new(2, Duration::from_secs(60));

        assert_eq!(limiter.check("uploads/new", "client-a", config), RateLimitResult::Allowed);
        assert_eq!(limiter.check("uploads/new", "client-a", config), RateLimitResult::Allowed);
        assert!(!limiter.check("uploads/new", "client-a", config).is_allowed());
    }

    #[test]
    fn scopes_and_keys_are_independent() {
        let limiter = RateLimiter::new();
        let config = RateLimitConfig::new(1, Duration::from_secs(60));

        assert!(limiter.check("uploads/new", "client-a", config).is_allowed());
        assert!(limiter.check("uploads/new", "client-b", config).is_allowed());
        assert!(limiter.check("admin/pair/new", "client-a", config).is_allowed());
    }

    #[test]
    fn window_reopens_once_it_elapses() {
        let limiter = RateLimiter::new();
        let config = RateLimitConfig::new(1, Duration::from_millis(20));

        assert!(limiter.check("uploads/new", "client-a", config).is_allowed());
        assert!(!limiter.check("uploads/new", "client-a", config).is_allowed());

        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.check("uploads/new", "client-a", config).is_allowed());
    }

    #[test]
    fn denied_retry_after_is_bounded_by_the_window() {
        let limiter = RateLimiter::new();
        let config = RateLimitConfig::new(1, Duration::from_secs(30));

        limiter.check("uploads/new", "client-a", config);
        let result = limiter.check("uploads/new", "client-a", config);
        match result {
            RateLimitResult::Denied { retry_after } => assert!(retry_after <= Duration::from_secs(30)),
            RateLimitResult::Allowed => panic!("expected denial"),
        }
    }
}
