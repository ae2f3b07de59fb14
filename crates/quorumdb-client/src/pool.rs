//! Per-intent session pool with true node-level round-robin.
//!
//! The pool is two-tier: sessions are grouped into per-node buckets, each
//! bucket has its own rotation cursor, and an ordered node list with a node
//! cursor rotates across buckets. Successive acquisitions therefore spread
//! across nodes first and only then rotate within a node's sessions, so a
//! node with many sessions cannot starve its neighbours.
//!
//! All state sits behind one pool-wide read/write lock: mutations (add,
//! remove, reap, cursor advance) take it exclusively, enumeration takes it
//! shared. `add_batch` is a single critical section; scale-up relies on
//! that to publish a whole batch atomically with respect to selection.

use crate::session::Session;
use quorumdb_common::protocol::error::{ClientError, Result};
use quorumdb_common::Intent;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct PoolInner {
    /// Sessions grouped by node id.
    buckets: HashMap<String, Vec<Arc<Session>>>,
    /// Next-session rotation cursor per node.
    cursors: HashMap<String, usize>,
    /// Node rotation order; every key in `buckets` appears here exactly once.
    node_order: Vec<String>,
    /// Next-node rotation cursor.
    node_cursor: usize,
    /// Shared per-node transports, used when multi-client mode is off.
    shared_transports: HashMap<String, reqwest::Client>,
}

impl PoolInner {
    /// Removes a node that no longer holds sessions from the rotation
    /// bookkeeping. The write pool also owns the shared-transport entry.
    fn drop_empty_node(&mut self, node_id: &str, is_write_pool: bool) {
        self.buckets.remove(node_id);
        self.cursors.remove(node_id);
        if is_write_pool {
            self.shared_transports.remove(node_id);
        }
        if let Some(pos) = self.node_order.iter().position(|id| id == node_id) {
            self.node_order.remove(pos);
            if self.node_cursor >= self.node_order.len() {
                self.node_cursor = 0;
            }
        }
    }

    fn register_node(&mut self, node_id: &str) {
        if !self.buckets.contains_key(node_id) {
            self.buckets.insert(node_id.to_string(), Vec::new());
            self.cursors.insert(node_id.to_string(), 0);
            self.node_order.push(node_id.to_string());
        }
    }
}

/// A pool of authenticated sessions for one intent (read or write).
pub struct SessionPool {
    intent: Intent,
    inner: RwLock<PoolInner>,
}

impl SessionPool {
    pub fn new(intent: Intent) -> Self {
        Self {
            intent,
            inner: RwLock::new(PoolInner::default()),
        }
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }

    pub fn is_write_pool(&self) -> bool {
        self.intent.is_write()
    }

    /// Total sessions across all nodes.
    pub async fn size(&self) -> usize {
        let inner = self.inner.read().await;
        inner.buckets.values().map(Vec::len).sum()
    }

    /// Sessions held for one node.
    pub async fn size_for(&self, node_id: &str) -> usize {
        let inner = self.inner.read().await;
        inner.buckets.get(node_id).map(Vec::len).unwrap_or(0)
    }

    /// Node ids currently holding sessions, in rotation order.
    pub async fn node_ids(&self) -> Vec<String> {
        self.inner.read().await.node_order.clone()
    }

    /// Appends one session to its node's bucket.
    pub async fn add(&self, session: Arc<Session>) {
        let mut inner = self.inner.write().await;
        let node_id = session.node_id().to_string();
        inner.register_node(&node_id);
        inner.buckets.get_mut(&node_id).unwrap().push(session);
    }

    /// Appends a batch of sessions in one critical section.
    pub async fn add_batch(&self, sessions: Vec<Arc<Session>>) {
        if sessions.is_empty() {
            return;
        }
        let mut inner = self.inner.write().await;
        for session in sessions {
            let node_id = session.node_id().to_string();
            inner.register_node(&node_id);
            inner.buckets.get_mut(&node_id).unwrap().push(session);
        }
    }

    /// Removes one specific session. Returns `false` when the session is not
    /// pooled (already reaped, or never added).
    pub async fn remove(&self, session: &Arc<Session>) -> bool {
        let mut inner = self.inner.write().await;
        let node_id = session.node_id().to_string();

        let Some(bucket) = inner.buckets.get_mut(&node_id) else {
            return false;
        };
        let Some(pos) = bucket.iter().position(|s| Arc::ptr_eq(s, session)) else {
            return false;
        };
        bucket.remove(pos);

        let remaining = bucket.len();
        if remaining == 0 {
            let is_write = self.is_write_pool();
            inner.drop_empty_node(&node_id, is_write);
        } else if let Some(cursor) = inner.cursors.get_mut(&node_id) {
            if *cursor >= remaining {
                *cursor = 0;
            }
        }
        true
    }

    /// Picks the next session using node-level round-robin.
    ///
    /// Scans at most one full lap of the node order starting at the node
    /// cursor; the first non-empty bucket serves, both cursors advance, and
    /// the session's last-used stamp is touched under the lock. The next
    /// call starts at the node *after* the one just served.
    pub async fn take_next(&self) -> Result<Arc<Session>> {
        let mut inner = self.inner.write().await;
        if inner.node_order.is_empty() {
            return Err(ClientError::NoSessions);
        }

        let node_count = inner.node_order.len();
        let start = inner.node_cursor;
        for offset in 0..node_count {
            let node_idx = (start + offset) % node_count;
            let node_id = inner.node_order[node_idx].clone();

            let bucket_len = inner.buckets.get(&node_id).map(Vec::len).unwrap_or(0);
            if bucket_len == 0 {
                continue;
            }

            let cursor = inner.cursors.get(&node_id).copied().unwrap_or(0) % bucket_len;
            let session = inner.buckets[&node_id][cursor].clone();

            inner.cursors.insert(node_id, (cursor + 1) % bucket_len);
            inner.node_cursor = (node_idx + 1) % node_count;

            session.touch();
            return Ok(session);
        }

        Err(ClientError::NoSessions)
    }

    /// Picks the next session from a specific node's bucket.
    pub async fn take_for(&self, node_id: &str) -> Result<Arc<Session>> {
        let mut inner = self.inner.write().await;
        let bucket_len = inner.buckets.get(node_id).map(Vec::len).unwrap_or(0);
        if bucket_len == 0 {
            return Err(ClientError::NoSessions);
        }

        let cursor = inner.cursors.get(node_id).copied().unwrap_or(0) % bucket_len;
        let session = inner.buckets[node_id][cursor].clone();
        inner.cursors.insert(node_id.to_string(), (cursor + 1) % bucket_len);

        session.touch();
        Ok(session)
    }

    /// Every pooled session, across all nodes.
    pub async fn all_sessions(&self) -> Vec<Arc<Session>> {
        let inner = self.inner.read().await;
        inner.buckets.values().flatten().cloned().collect()
    }

    /// Every pooled session for one node.
    pub async fn sessions_for(&self, node_id: &str) -> Vec<Arc<Session>> {
        let inner = self.inner.read().await;
        inner.buckets.get(node_id).cloned().unwrap_or_default()
    }

    /// Sessions unused for longer than `idle_timeout`.
    pub async fn idle_sessions(&self, idle_timeout: Duration) -> Vec<Arc<Session>> {
        let inner = self.inner.read().await;
        inner
            .buckets
            .values()
            .flatten()
            .filter(|s| s.idle_for() > idle_timeout)
            .cloned()
            .collect()
    }

    /// Removes idle sessions while keeping every node at `min_per_node`.
    ///
    /// Recently-used sessions are always kept; idle ones are kept only as
    /// far as needed to honour the minimum. Nodes whose bucket empties out
    /// are dropped from the rotation entirely. Returns the per-node removal
    /// counts for stats bookkeeping.
    pub async fn reap(&self, idle_timeout: Duration, min_per_node: usize) -> Vec<(String, usize)> {
        let mut inner = self.inner.write().await;
        let mut removed = Vec::new();

        let node_ids: Vec<String> = inner.node_order.clone();
        for node_id in node_ids {
            let Some(bucket) = inner.buckets.get(&node_id) else {
                continue;
            };
            if bucket.len() <= min_per_node {
                continue;
            }

            let (active, idle): (Vec<_>, Vec<_>) = bucket
                .iter()
                .cloned()
                .partition(|s| s.idle_for() <= idle_timeout);

            let can_remove = bucket.len() - min_per_node;
            let will_remove = idle.len().min(can_remove);
            if will_remove == 0 {
                continue;
            }

            let keep_idle = idle.len() - will_remove;
            let mut kept = active;
            kept.extend(idle.into_iter().take(keep_idle));

            debug!(
                pool = %self.intent,
                node = %node_id,
                removed = will_remove,
                remaining = kept.len(),
                "reaped idle sessions"
            );

            let remaining = kept.len();
            inner.buckets.insert(node_id.clone(), kept);
            if let Some(cursor) = inner.cursors.get_mut(&node_id) {
                if *cursor >= remaining && remaining > 0 {
                    *cursor = 0;
                }
            }
            removed.push((node_id.clone(), will_remove));

            if remaining == 0 {
                let is_write = self.is_write_pool();
                inner.drop_empty_node(&node_id, is_write);
            }
        }

        removed
    }

    /// Drops all sessions, cursors and shared transports.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        *inner = PoolInner::default();
    }

    /// Shared transport for a node, if one was registered.
    pub async fn shared_transport(&self, node_id: &str) -> Option<reqwest::Client> {
        let inner = self.inner.read().await;
        inner.shared_transports.get(node_id).cloned()
    }

    /// Registers a shared transport for a node.
    pub async fn set_shared_transport(&self, node_id: &str, client: reqwest::Client) {
        let mut inner = self.inner.write().await;
        inner.shared_transports.insert(node_id.to_string(), client);
    }
}
