//! The relay's subscription index (§4.5 state):
//!
//! - `clientSubs: client -> set<threadId>`
//! - `anchorSubs: anchor -> set<threadId>`
//! - `threadToClients: threadId -> set<client>`
//! - `threadToAnchors: threadId -> set<anchor>`
//! - `anchors: anchor -> {stableId, hostname, platform, connectedAt}`
//!
//! Every table is its own `DashMap`, short-critical-section protected per
//! §5 — a subscribe/unsubscribe never holds a lock across anything that
//! could block.

use std::collections::HashSet;

use dashmap::DashMap;

use crate::connection::{AnchorConnection, AnchorInfo, ClientConnection, ConnectionId};

/// The relay's live connection and subscription tables.
#[derive(Default)]
pub struct SubscriptionIndex {
    clients: DashMap<ConnectionId, ClientConnection>,
    anchors: DashMap<ConnectionId, AnchorConnection>,
    anchor_info: DashMap<ConnectionId, AnchorInfo>,
    client_subs: DashMap<ConnectionId, HashSet<String>>,
    anchor_subs: DashMap<ConnectionId, HashSet<String>>,
    thread_to_clients: DashMap<String, HashSet<ConnectionId>>,
    thread_to_anchors: DashMap<String, HashSet<ConnectionId>>,
    /// Anchor connections keyed by stable id, for reconnect replacement.
    anchors_by_stable_id: DashMap<String, ConnectionId>,
}

impl SubscriptionIndex {
    /// An index with nothing connected.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly connected client.
    pub fn add_client(&self, conn: ClientConnection) {
        self.client_subs.insert(conn.id, HashSet::new());
        self.clients.insert(conn.id, conn);
    }

    /// Drop a disconnected client from every table it appears in.
    pub fn remove_client(&self, id: ConnectionId) {
        self.clients.remove(&id);
        if let Some((_, threads)) = self.client_subs.remove(&id) {
            for thread_id in threads {
                if let Some(mut set) = self.thread_to_clients.get_mut(&thread_id) {
                    set.remove(&id);
                }
            }
        }
    }

    /// Register a newly connected anchor, replacing any prior connection
    /// under the same stable id (§4.5 connection lifecycle). Returns the
    /// replaced connection's id, if any, so the caller can close it with
    /// close code 1000/"replaced".
    pub fn add_anchor(&self, conn: AnchorConnection, info: AnchorInfo) -> Option<ConnectionId> {
        let replaced = self.anchors_by_stable_id.insert(conn.stable_id.clone(), conn.id);
        if let Some(prior_id) = replaced {
            self.remove_anchor(prior_id);
        }
        self.anchor_subs.insert(conn.id, HashSet::new());
        self.anchor_info.insert(conn.id, info);
        self.anchors.insert(conn.id, conn);
        replaced
    }

    /// Drop a disconnected anchor from every table it appears in.
    pub fn remove_anchor(&self, id: ConnectionId) {
        if let Some((_, conn)) = self.anchors.remove(&id) {
            self.anchors_by_stable_id.remove_if(&conn.stable_id, |_, v| *v == id);
        }
        self.anchor_info.remove(&id);
        if let Some((_, threads)) = self.anchor_subs.remove(&id) {
            for thread_id in threads {
                if let Some(mut set) = self.thread_to_anchors.get_mut(&thread_id) {
                    set.remove(&id);
                }
            }
        }
    }

    /// Subscribe a client to a thread.
    pub fn subscribe_client(&self, id: ConnectionId, thread_id: impl Into<String>) {
        let thread_id = thread_id.into();
        if let Some(mut subs) = self.client_subs.get_mut(&id) {
            subs.insert(thread_id.clone());
        }
        self.thread_to_clients.entry(thread_id).or_default().insert(id);
    }

    /// Unsubscribe a client from a thread.
    pub fn unsubscribe_client(&self, id: ConnectionId, thread_id: &str) {
        if let Some(mut subs) = self.client_subs.get_mut(&id) {
            subs.remove(thread_id);
        }
        if let Some(mut set) = self.thread_to_clients.get_mut(thread_id) {
            set.remove(&id);
        }
    }

    /// Subscribe an anchor to a thread (anchors self-subscribe once they
    /// observe a thread id flow through, §4.5 step 5).
    pub fn subscribe_anchor(&self, id: ConnectionId, thread_id: impl Into<String>) {
        let thread_id = thread_id.into();
        if let Some(mut subs) = self.anchor_subs.get_mut(&id) {
            subs.insert(thread_id.clone());
        }
        self.thread_to_anchors.entry(thread_id).or_default().insert(id);
    }

    /// Clients currently subscribed to `thread_id`.
    #[must_use]
    pub fn clients_for_thread(&self, thread_id: &str) -> Vec<ClientConnection> {
        let Some(ids) = self.thread_to_clients.get(thread_id) else {
            return Vec::new();
        };
        ids.iter().filter_map(|id| self.clients.get(id).map(|c| c.clone())).collect()
    }

    /// Anchors currently subscribed to `thread_id`.
    #[must_use]
    pub fn anchors_for_thread(&self, thread_id: &str) -> Vec<AnchorConnection> {
        let Some(ids) = self.thread_to_anchors.get(thread_id) else {
            return Vec::new();
        };
        ids.iter().filter_map(|id| self.anchors.get(id).map(|a| a.clone())).collect()
    }

    /// The anchor currently registered under `stable_id`, if any — used to
    /// close its socket before a reconnect replaces it.
    #[must_use]
    pub fn anchor_by_stable_id(&self, stable_id: &str) -> Option<AnchorConnection> {
        let id = *self.anchors_by_stable_id.get(stable_id)?;
        self.anchors.get(&id).map(|a| a.clone())
    }

    /// The connection matching `id`, if it's still connected — used to
    /// answer a heartbeat ping on the anchor socket that sent it.
    #[must_use]
    pub fn anchor(&self, id: ConnectionId) -> Option<AnchorConnection> {
        self.anchors.get(&id).map(|a| a.clone())
    }

    /// Every connected client, for the broadcast-to-all-clients safety net.
    #[must_use]
    pub fn all_clients(&self) -> Vec<ClientConnection> {
        self.clients.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Every connected anchor, for the broadcast-to-all-anchors safety net.
    #[must_use]
    pub fn all_anchors(&self) -> Vec<AnchorConnection> {
        self.anchors.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Whether the client with `id` is currently subscribed to
    /// `thread_id` — the approval-decision authorization check (§4.6).
    #[must_use]
    pub fn client_is_subscribed(&self, id: ConnectionId, thread_id: &str) -> bool {
        self.client_subs.get(&id).is_some_and(|subs| subs.contains(thread_id))
    }

    /// A snapshot of every connected anchor's reported identity, for
    /// `list-anchors`.
    #[must_use]
    pub fn anchor_infos(&self) -> Vec<AnchorInfo> {
        self.anchor_info.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Number of connected clients and anchors, for `/admin/status`.
    #[must_use]
    pub fn connection_counts(&self) -> (usize, usize) {
        (self.clients.len(), self.anchors.len())
    }
}

impl Clone for AnchorInfo {
    fn clone(&self) -> Self {
        Self {
            stable_id: self.stable_id.clone(),
            hostname: self.hostname.clone(),
            platform: self.platform.clone(),
            connected_at: self.connected_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::OutboundHandle;
    use tokio::sync::mpsc;

    fn client(id: ConnectionId) -> ClientConnection {
        let (tx, _rx) = mpsc::channel(8);
        ClientConnection {
            id,
            scope: orbit_auth::Scope::Full,
            outbound: OutboundHandle::new(tx),
        }
    }

    fn anchor(id: ConnectionId, stable_id: &str) -> AnchorConnection {
        let (tx, _rx) = mpsc::channel(8);
        AnchorConnection {
            id,
            stable_id: stable_id.to_string(),
            outbound: OutboundHandle::new(tx),
        }
    }

    #[test]
    fn subscribing_a_client_indexes_it_by_thread() {
        let index = SubscriptionIndex::new();
        let id = ConnectionId::new_v4();
        index.add_client(client(id));
        index.subscribe_client(id, "codex:t1");

        assert_eq!(index.clients_for_thread("codex:t1").len(), 1);
        assert!(index.client_is_subscribed(id, "codex:t1"));
    }

    #[test]
    fn removing_a_client_clears_its_thread_index() {
        let index = SubscriptionIndex::new();
        let id = ConnectionId::new_v4();
        index.add_client(client(id));
        index.subscribe_client(id, "codex:t1");
        index.remove_client(id);

        assert!(index.clients_for_thread("codex:t1").is_empty());
    }

    #[test]
    fn reconnecting_anchor_with_same_stable_id_replaces_prior() {
        let index = SubscriptionIndex::new();
        let first = ConnectionId::new_v4();
        let second = ConnectionId::new_v4();
        index.add_anchor(anchor(first, "mac-mini"), AnchorInfo::from_hello("mac-mini", &serde_json::json!({})));
        let replaced = index.add_anchor(anchor(second, "mac-mini"), AnchorInfo::from_hello("mac-mini", &serde_json::json!({})));

        assert_eq!(replaced, Some(first));
        assert_eq!(index.anchor_infos().len(), 1);
    }

    #[test]
    fn distinct_threads_do_not_cross_subscribe() {
        let index = SubscriptionIndex::new();
        let id = ConnectionId::new_v4();
        index.add_client(client(id));
        index.subscribe_client(id, "codex:t1");

        assert!(index.clients_for_thread("codex:t2").is_empty());
    }
}
