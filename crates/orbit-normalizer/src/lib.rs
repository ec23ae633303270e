//! Streaming event normalizer (§4.2).
//!
//! Aggregates chunked provider deltas keyed by `(sessionId, turnId)` into
//! normalized events: a type switch or a `done`/`error` marker flushes the
//! accumulated context; an idle context flushes itself after an inactivity
//! timeout. Emitted events are broadcast on an [`EventBus`]-style channel
//! rather than returned synchronously, since a timeout flush has no
//! synchronous caller to return to.

#![deny(unsafe_code)]

mod context;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use orbit_core::event::NormalizedEvent;
use orbit_core::ReliabilityCounters;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use context::{map_category, StreamingContext};

/// Default inactivity timeout before a buffered streaming context is
/// flushed and discarded (§4.2 step 6, §7 timeouts table).
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default broadcast channel capacity, matching the backlog the relay's
/// subscription fabric can plausibly need to absorb between polls.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

fn context_key(session_id: &str, turn_id: &str) -> String {
    format!("{session_id}:{turn_id}")
}

/// Aggregates a single provider's raw streaming updates into
/// [`NormalizedEvent`]s and broadcasts them to subscribers.
#[derive(Clone)]
pub struct Normalizer {
    inner: Arc<Inner>,
}

struct Inner {
    contexts: DashMap<String, StreamingContext>,
    sender: broadcast::Sender<NormalizedEvent>,
    timeout: Duration,
    counters: Option<Arc<ReliabilityCounters>>,
}

impl Normalizer {
    /// A normalizer with the default inactivity timeout and no reliability
    /// counters wired in.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_INACTIVITY_TIMEOUT)
    }

    /// A normalizer with a custom inactivity timeout.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                contexts: DashMap::new(),
                sender,
                timeout,
                counters: None,
            }),
        }
    }

    /// Attach reliability counters; timeout flushes increment
    /// `normalizer_timeouts`. Intended to be chained immediately after
    /// construction, before the normalizer is cloned or shared.
    #[must_use]
    pub fn with_counters(self, counters: Arc<ReliabilityCounters>) -> Self {
        Self {
            inner: Arc::new(Inner {
                contexts: DashMap::new(),
                sender: self.inner.sender.clone(),
                timeout: self.inner.timeout,
                counters: Some(counters),
            }),
        }
    }

    /// Subscribe to every emitted normalized event.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<NormalizedEvent> {
        self.inner.sender.subscribe()
    }

    /// Process one raw update `{type, delta?, done?, ...fields}` for
    /// `(provider, sessionId, turnId)`. May synchronously emit up to two
    /// events (an old-context type-switch flush, then a done/error flush of
    /// the resulting context) in arrival order; both are also broadcast.
    pub fn process(&self, provider: &str, session_id: &str, turn_id: &str, update: Value) -> Vec<NormalizedEvent> {
        let update_type = update.get("type").and_then(Value::as_str).unwrap_or("");
        let new_category = map_category(update_type);
        let key = context_key(session_id, turn_id);
        let mut emitted = Vec::with_capacity(2);

        let existing_category = self.inner.contexts.get(&key).map(|c| c.category);
        let should_switch = matches!(existing_category, Some(cat) if cat != new_category)
            && self
                .inner
                .contexts
                .get(&key)
                .map(StreamingContext::has_chunks)
                .unwrap_or(false);

        if should_switch {
            if let Some((_, old)) = self.inner.contexts.remove(&key) {
                let event = old.flush(NormalizedEvent::new_event_id(), provider);
                self.emit(event.clone());
                emitted.push(event);
            }
        }

        {
            let mut entry = self
                .inner
                .contexts
                .entry(key.clone())
                .or_insert_with(|| StreamingContext::new(provider.to_string(), session_id.to_string(), turn_id.to_string(), new_category));
            entry.apply(&update);
            entry.generation += 1;
        }

        let done = update.get("done").and_then(Value::as_bool).unwrap_or(false) || update_type == "error";

        if done {
            if let Some((_, ctx)) = self.inner.contexts.remove(&key) {
                let event = ctx.flush(NormalizedEvent::new_event_id(), provider);
                self.emit(event.clone());
                emitted.push(event);
            }
        } else {
            self.arm_timeout(key, provider.to_string());
        }

        emitted
    }

    fn emit(&self, event: NormalizedEvent) {
        // No receivers is a normal, unremarkable state (no client has
        // subscribed to this thread yet).
        let _ = self.inner.sender.send(event);
    }

    fn arm_timeout(&self, key: String, provider: String) {
        let generation = match self.inner.contexts.get(&key) {
            Some(ctx) => ctx.generation,
            None => return,
        };
        let inner = self.inner.clone();
        let timeout = inner.timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let still_current = inner
                .contexts
                .get(&key)
                .map(|ctx| ctx.generation == generation)
                .unwrap_or(false);
            if !still_current {
                return;
            }
            if let Some((_, ctx)) = inner.contexts.remove(&key) {
                warn!(
                    session_id = %ctx.session_id,
                    turn_id = %ctx.turn_id,
                    "streaming context flushed on inactivity timeout"
                );
                if let Some(counters) = &inner.counters {
                    counters.inc_normalizer_timeout();
                }
                let event = ctx.flush(NormalizedEvent::new_event_id(), &provider);
                let _ = inner.sender.send(event);
            } else {
                trace!(%key, "timeout fired for already-removed context");
            }
        });
    }

    /// Number of streaming contexts currently buffered, across all
    /// sessions and turns.
    #[must_use]
    pub fn active_context_count(&self) -> usize {
        self.inner.contexts.len()
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn aggregates_chunks_into_one_event_on_done() {
        let normalizer = Normalizer::new();
        let mut rx = normalizer.subscribe();

        assert!(normalizer
            .process("codex", "s1", "t1", json!({"type":"content","delta":"Hello "}))
            .is_empty());
        assert!(normalizer
            .process("codex", "s1", "t1", json!({"type":"content","delta":"world"}))
            .is_empty());
        let emitted = normalizer.process("codex", "s1", "t1", json!({"type":"content","delta":"!","done":true}));

        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].text.as_deref(), Some("Hello world!"));
        assert_eq!(emitted[0].category, orbit_core::EventCategory::AgentMessage);

        let broadcast_event = rx.recv().await.unwrap();
        assert_eq!(broadcast_event.event_id, emitted[0].event_id);
    }

    #[tokio::test]
    async fn type_switch_flushes_old_context_before_starting_new_one() {
        let normalizer = Normalizer::new();

        assert!(normalizer
            .process("codex", "s1", "t1", json!({"type":"content","delta":"partial"}))
            .is_empty());

        let emitted = normalizer.process(
            "codex",
            "s1",
            "t1",
            json!({"type":"error","error":"boom"}),
        );

        // The content flush (type switch) and the error flush (done) both
        // land in this single call, content first.
        assert_eq!(emitted.len(), 2);
        assert_eq!(emitted[0].category, orbit_core::EventCategory::AgentMessage);
        assert_eq!(emitted[0].text.as_deref(), Some("partial"));
        assert_eq!(emitted[1].category, orbit_core::EventCategory::LifecycleStatus);
    }

    #[tokio::test]
    async fn empty_text_is_represented_as_absent() {
        let normalizer = Normalizer::new();
        let emitted = normalizer.process(
            "codex",
            "s1",
            "t1",
            json!({"type":"tool","command":"ls","done":true}),
        );
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].text, None);
        assert!(emitted[0].payload.is_some());
    }

    #[tokio::test]
    async fn distinct_turns_do_not_interfere() {
        let normalizer = Normalizer::new();
        assert!(normalizer
            .process("codex", "s1", "t1", json!({"type":"content","delta":"a"}))
            .is_empty());
        assert!(normalizer
            .process("codex", "s1", "t2", json!({"type":"content","delta":"b"}))
            .is_empty());
        assert_eq!(normalizer.active_context_count(), 2);
    }

    #[tokio::test]
    async fn inactivity_timeout_flushes_buffered_context() {
        let normalizer = Normalizer::with_timeout(Duration::from_millis(50));
        let mut rx = normalizer.subscribe();

        assert!(normalizer
            .process("codex", "s1", "t1", json!({"type":"content","delta":"stalled"}))
            .is_empty());

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.text.as_deref(), Some("stalled"));
        assert_eq!(normalizer.active_context_count(), 0);
    }

    #[tokio::test]
    async fn steady_chunk_stream_never_times_out() {
        let normalizer = Normalizer::with_timeout(Duration::from_millis(80));
        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(40)).await;
            assert!(normalizer
                .process("codex", "s1", "t1", json!({"type":"content","delta":"x"}))
                .is_empty());
        }
        assert_eq!(normalizer.active_context_count(), 1);
    }
}
