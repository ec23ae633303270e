//! Duplicate suppression for client `clientRequestId`s (§4.5 step 1): a
//! request carrying an id seen within the last 10 minutes is dropped
//! rather than routed twice.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// How long a `clientRequestId` is remembered before it can be reused.
pub const DEDUP_WINDOW: Duration = Duration::from_secs(10 * 60);

const GC_THRESHOLD: usize = 5000;

/// Tracks recently-seen `clientRequestId`s.
#[derive(Default)]
pub struct DedupTracker {
    seen: DashMap<String, Instant>,
}

impl DedupTracker {
    /// A tracker with nothing recorded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id` if it has not been seen within [`DEDUP_WINDOW`].
    /// Returns `true` the first time (route it), `false` on a repeat
    /// (drop it).
    pub fn record_if_new(&self, id: &str) -> bool {
        if self.seen.len() > GC_THRESHOLD {
            self.gc();
        }

        let now = Instant::now();
        if let Some(seen_at) = self.seen.get(id) {
            if now.duration_since(*seen_at) < DEDUP_WINDOW {
                return false;
            }
        }
        self.seen.insert(id.to_string(), now);
        true
    }

    fn gc(&self) {
        let now = Instant::now();
        self.seen.retain(|_, seen_at| now.duration_since(*seen_at) < DEDUP_WINDOW);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sighting_is_new_second_is_not() {
        let tracker = DedupTracker::new();
        assert!(tracker.record_if_new("req-1"));
        assert!(!tracker.record_if_new("req-1"));
    }

    #[test]
    fn distinct_ids_are_independent() {
        let tracker = DedupTracker::new();
        assert!(tracker.record_if_new("req-1"));
        assert!(tracker.record_if_new("req-2"));
    }
}
