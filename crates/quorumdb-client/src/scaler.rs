//! Load-driven scale-up and the periodic idle reaper.
//!
//! Scale-up triggers are enqueued onto a bounded channel and drained by one
//! background worker, so a traffic storm cannot spawn an unbounded number of
//! authentication bursts. The 10 s per-(node, intent) debounce is stamped at
//! trigger time inside the stats entry; the queue only sees triggers that
//! survived it. The reaper is a separate periodic task that trims idle
//! sessions while honouring the per-node minimum.
//!
//! Both tasks hold only a weak reference to the client internals: dropping
//! the last client handle ends them, and `close` ends them explicitly.

use crate::client::ClientInner;
use crate::session::Session;
use quorumdb_common::protocol::error::Result;
use quorumdb_common::protocol::status::{NodeDescriptor, NodeMode};
use quorumdb_common::Intent;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Depth of the scale-up trigger queue. Overflow drops the trigger; the next
/// request past the threshold re-enqueues it.
pub(crate) const SCALE_QUEUE_DEPTH: usize = 32;

/// Identity of the node a scale-up should add sessions for.
#[derive(Debug, Clone)]
pub(crate) struct ScaleTarget {
    pub url: String,
    pub node_id: String,
    pub mode: NodeMode,
    pub is_leader: bool,
}

impl ScaleTarget {
    pub fn from_session(session: &Session) -> Self {
        Self {
            url: session.url().to_string(),
            node_id: session.node_id().to_string(),
            mode: session.mode(),
            is_leader: session.is_leader(),
        }
    }

    pub fn from_node(node: &NodeDescriptor) -> Self {
        Self {
            url: node.url.clone(),
            node_id: node.node_id.clone(),
            mode: node.mode,
            is_leader: node.is_leader,
        }
    }
}

/// One queued scale-up trigger.
#[derive(Debug, Clone)]
pub(crate) struct ScaleRequest {
    pub target: ScaleTarget,
    pub intent: Intent,
}

/// Spawns the scale-up worker and returns its queue sender.
///
/// The worker exits when every sender is dropped or the client internals are
/// gone.
pub(crate) fn spawn_scale_worker(inner: Weak<ClientInner>) -> mpsc::Sender<ScaleRequest> {
    let (tx, mut rx) = mpsc::channel::<ScaleRequest>(SCALE_QUEUE_DEPTH);

    tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            let Some(client) = inner.upgrade() else {
                break;
            };
            if let Err(err) = client.scale_up(&request.target, request.intent).await {
                warn!(
                    node = %request.target.node_id,
                    intent = %request.intent,
                    error = %err,
                    "scale-up failed"
                );
            }
        }
        debug!("scale worker stopped");
    });

    tx
}

/// Handle to the running reaper task.
pub(crate) struct ReaperHandle {
    shutdown: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl ReaperHandle {
    /// Signals shutdown and waits for the current tick, if any, to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(()).await;
        let _ = self.handle.await;
    }
}

/// Spawns the periodic reaper. The shutdown signal is observed at the top of
/// every tick, so `stop` completes in bounded time.
pub(crate) fn spawn_reaper(inner: Weak<ClientInner>, period: Duration) -> ReaperHandle {
    let (tx, mut rx) = mpsc::channel::<()>(1);

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // the first tick of an interval fires immediately; skip it so the
        // first reap happens one full period after startup
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = rx.recv() => break,
                _ = ticker.tick() => {
                    let Some(client) = inner.upgrade() else {
                        break;
                    };
                    client.reap_idle_sessions().await;
                }
            }
        }
        debug!("reaper stopped");
    });

    ReaperHandle {
        shutdown: tx,
        handle,
    }
}

impl ClientInner {
    /// Per-node session ceiling: the cluster-reported `MaxPool` for reads
    /// (falling back to the configured maximum), the write ceiling for
    /// writes.
    pub(crate) fn ceiling_for(&self, node_id: &str, intent: Intent) -> usize {
        if intent.is_write() {
            return self.config.pool.max_write_sessions;
        }
        let status = self.status.read().unwrap();
        status
            .as_ref()
            .and_then(|s| s.max_pool_for(node_id))
            .filter(|&max| max > 0)
            .unwrap_or(self.config.pool.max_sessions)
    }

    /// Transport for a new session on the given node: a fresh client per
    /// session in multi-client mode, the node's shared client otherwise
    /// (created on first use and mirrored into both pools).
    pub(crate) async fn transport_for(&self, node_id: &str) -> Result<reqwest::Client> {
        if self.config.pool.multi_client {
            return self.config.http.build_client();
        }
        if let Some(client) = self.read_pool.shared_transport(node_id).await {
            return Ok(client);
        }
        let client = self.config.http.build_client()?;
        self.read_pool
            .set_shared_transport(node_id, client.clone())
            .await;
        self.write_pool
            .set_shared_transport(node_id, client.clone())
            .await;
        Ok(client)
    }

    /// Creates one authenticated session for the target node. Each session
    /// gets its own token pair from `/db/connect`.
    async fn new_authenticated_session(
        &self,
        target: &ScaleTarget,
        http: reqwest::Client,
    ) -> Result<Arc<Session>> {
        let session = Arc::new(Session::new(
            &self.config,
            &target.url,
            &target.node_id,
            target.mode,
            target.is_leader,
            http,
        ));
        session.authenticate(&self.config).await?;
        Ok(session)
    }

    /// Adds up to a batch of sessions for (target, intent), capped by the
    /// node's ceiling. Sessions that fail to authenticate are skipped; the
    /// ones that succeed are published as a single batch.
    pub(crate) async fn scale_up(&self, target: &ScaleTarget, intent: Intent) -> Result<()> {
        let pool = self.pool(intent);
        let ceiling = self.ceiling_for(&target.node_id, intent);
        let current = pool.size_for(&target.node_id).await;
        let add = self
            .config
            .pool
            .scale_up_batch
            .min(ceiling.saturating_sub(current));
        if add == 0 {
            return Ok(());
        }

        // transports resolve sequentially so a shared per-node client is
        // created exactly once; authentication then runs concurrently
        let mut transports = Vec::with_capacity(add);
        for _ in 0..add {
            transports.push(self.transport_for(&target.node_id).await?);
        }
        let attempts = futures::future::join_all(
            transports
                .into_iter()
                .map(|http| self.new_authenticated_session(target, http)),
        )
        .await;
        let mut created = Vec::with_capacity(add);
        for attempt in attempts {
            match attempt {
                Ok(session) => created.push(session),
                Err(err) => {
                    warn!(
                        node = %target.node_id,
                        url = %target.url,
                        error = %err,
                        "failed to create pool session"
                    );
                }
            }
        }
        if created.is_empty() {
            return Ok(());
        }

        let added = created.len();
        pool.add_batch(created).await;
        self.stats
            .get_or_create(&target.node_id, intent)
            .mark_scale_up();
        let total = pool.size_for(&target.node_id).await;
        debug!(
            node = %target.node_id,
            intent = %intent,
            added,
            total,
            "scaled up"
        );
        Ok(())
    }

    /// One reaper pass: trims the read pool, then the write pool, and
    /// updates the matching stats entries.
    pub(crate) async fn reap_idle_sessions(&self) {
        let idle_timeout = self.config.pool.idle_timeout;

        for intent in [Intent::Read, Intent::Write] {
            let pool = self.pool(intent);
            let min = self.config.pool.min_sessions_for(intent.is_write());
            let removed = pool.reap(idle_timeout, min).await;

            for (node_id, count) in &removed {
                self.stats.get_or_create(node_id, intent).mark_scale_down();
                debug!(node = %node_id, intent = %intent, removed = count, "scaled down");
            }
            for node_id in pool.node_ids().await {
                if let Some(stats) = self.stats.get(&node_id, intent) {
                    stats.mark_cleanup();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use quorumdb_common::config::{ClientConfig, PoolConfig};
    use quorumdb_common::protocol::status::ClusterStatus;

    fn client_with(pool: PoolConfig) -> Client {
        Client::new(ClientConfig::default().with_pool(pool)).unwrap()
    }

    fn install_status(client: &Client, status: ClusterStatus) {
        *client.inner().status.write().unwrap() = Some(status);
    }

    fn two_node_status() -> ClusterStatus {
        serde_json::from_value(serde_json::json!({
            "URL": "http://127.0.0.1:11",
            "NodeID": "1",
            "Mode": "rw",
            "IsLeader": true,
            "MaxPool": 25,
            "Peers": [
                {"URL": "http://127.0.0.1:12", "NodeID": "2", "Mode": "r", "MaxPool": 4}
            ]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_ceiling_uses_status_for_reads() {
        let client = client_with(PoolConfig::default().with_max_sessions(10));
        install_status(&client, two_node_status());

        assert_eq!(client.inner().ceiling_for("1", Intent::Read), 25);
        assert_eq!(client.inner().ceiling_for("2", Intent::Read), 4);
        // unknown node falls back to the configured maximum
        assert_eq!(client.inner().ceiling_for("9", Intent::Read), 10);
    }

    #[tokio::test]
    async fn test_ceiling_without_status_uses_config() {
        let client = client_with(PoolConfig::default().with_max_sessions(7));
        assert_eq!(client.inner().ceiling_for("1", Intent::Read), 7);
    }

    #[tokio::test]
    async fn test_write_ceiling_ignores_status() {
        let client = client_with(PoolConfig::default().with_max_write_sessions(2));
        install_status(&client, two_node_status());
        assert_eq!(client.inner().ceiling_for("1", Intent::Write), 2);
    }

    #[tokio::test]
    async fn test_shared_transport_created_once() {
        let client = client_with(PoolConfig::default().with_multi_client(false));
        let inner = client.inner();

        assert!(inner.read_pool.shared_transport("1").await.is_none());
        let _first = inner.transport_for("1").await.unwrap();
        assert!(inner.read_pool.shared_transport("1").await.is_some());
        assert!(inner.write_pool.shared_transport("1").await.is_some());
    }

    #[tokio::test]
    async fn test_multi_client_skips_shared_map() {
        let client = client_with(PoolConfig::default().with_multi_client(true));
        let inner = client.inner();

        let _client = inner.transport_for("1").await.unwrap();
        assert!(inner.read_pool.shared_transport("1").await.is_none());
    }

    #[test]
    fn test_scale_target_from_node() {
        let node = NodeDescriptor {
            url: "http://127.0.0.1:12".to_string(),
            node_id: "2".to_string(),
            mode: NodeMode::Read,
            is_leader: false,
            max_pool: 4,
        };
        let target = ScaleTarget::from_node(&node);
        assert_eq!(target.node_id, "2");
        assert_eq!(target.mode, NodeMode::Read);
        assert!(!target.is_leader);
    }
}
