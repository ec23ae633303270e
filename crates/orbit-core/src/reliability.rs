//! Process-wide reliability counters backing `/admin/status` (§3 SUPPLEMENT).

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Lock-free counters incremented across the relay whenever §7's
/// "log, increment counter, drop" propagation policy applies.
#[derive(Debug, Default)]
pub struct ReliabilityCounters {
    malformed_frames_dropped: AtomicU64,
    store_append_failures: AtomicU64,
    rate_limited_requests: AtomicU64,
    approval_timeouts: AtomicU64,
    adapter_restarts: AtomicU64,
    normalizer_timeouts: AtomicU64,
}

impl ReliabilityCounters {
    /// A fresh, zeroed counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a dropped malformed WS/RPC frame.
    pub fn inc_malformed_frame(&self) {
        self.malformed_frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed event-store append.
    pub fn inc_store_append_failure(&self) {
        self.store_append_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request rejected by the rate limiter.
    pub fn inc_rate_limited(&self) {
        self.rate_limited_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an approval that auto-cancelled on timeout.
    pub fn inc_approval_timeout(&self) {
        self.approval_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an adapter restart.
    pub fn inc_adapter_restart(&self) {
        self.adapter_restarts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a normalizer streaming-context timeout flush.
    pub fn inc_normalizer_timeout(&self) {
        self.normalizer_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// A serializable point-in-time snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ReliabilitySnapshot {
        ReliabilitySnapshot {
            malformed_frames_dropped: self.malformed_frames_dropped.load(Ordering::Relaxed),
            store_append_failures: self.store_append_failures.load(Ordering::Relaxed),
            rate_limited_requests: self.rate_limited_requests.load(Ordering::Relaxed),
            approval_timeouts: self.approval_timeouts.load(Ordering::Relaxed),
            adapter_restarts: self.adapter_restarts.load(Ordering::Relaxed),
            normalizer_timeouts: self.normalizer_timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Serializable snapshot of `ReliabilityCounters`, returned by
/// `/admin/status`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ReliabilitySnapshot {
    /// Malformed frames dropped.
    pub malformed_frames_dropped: u64,
    /// Event-store append failures.
    pub store_append_failures: u64,
    /// Requests rejected by the rate limiter.
    pub rate_limited_requests: u64,
    /// Approvals that auto-cancelled on timeout.
    pub approval_timeouts: u64,
    /// Adapter restarts observed.
    pub adapter_restarts: u64,
    /// Normalizer streaming-context timeout flushes.
    pub normalizer_timeouts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_increment() {
        let counters = ReliabilityCounters::new();
        assert_eq!(counters.snapshot().rate_limited_requests, 0);
        counters.inc_rate_limited();
        counters.inc_rate_limited();
        assert_eq!(counters.snapshot().rate_limited_requests, 2);
    }
}
