//! The client handle: construction, bootstrap, discovery and shutdown.

use crate::pool::SessionPool;
use crate::scaler::{self, ReaperHandle, ScaleRequest, ScaleTarget};
use crate::session::Session;
use quorumdb_common::config::ClientConfig;
use quorumdb_common::protocol::error::{ClientError, Result};
use quorumdb_common::protocol::status::ClusterStatus;
use quorumdb_common::protocol::{ConnectRequest, SchemaEntry, TokenPair};
use quorumdb_common::Intent;
use quorumdb_metrics::StatsMap;
use reqwest::Method;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock as StdRwLock};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{info, warn};

/// Shared internals behind the [`Client`] handle.
///
/// Background tasks (scale worker, reaper) hold this only weakly, so they
/// stop on their own when the last handle is dropped.
pub(crate) struct ClientInner {
    pub(crate) config: ClientConfig,
    pub(crate) connected: AtomicBool,
    /// The bootstrap session: authenticated first, used for discovery,
    /// writes fallback and pool warm-up.
    pub(crate) leader: RwLock<Option<Arc<Session>>>,
    pub(crate) read_pool: SessionPool,
    pub(crate) write_pool: SessionPool,
    pub(crate) stats: StatsMap,
    /// Cluster view from the last status refresh.
    pub(crate) status: StdRwLock<Option<ClusterStatus>>,
    scale_tx: StdRwLock<Option<mpsc::Sender<ScaleRequest>>>,
    reaper: Mutex<Option<ReaperHandle>>,
}

impl ClientInner {
    pub(crate) async fn leader_session(&self) -> Option<Arc<Session>> {
        self.leader.read().await.clone()
    }

    pub(crate) fn scale_sender(&self) -> Option<mpsc::Sender<ScaleRequest>> {
        self.scale_tx.read().unwrap().clone()
    }

    /// Recreates the leader session after a `close`.
    async fn ensure_leader_session(&self) -> Result<Arc<Session>> {
        let mut leader = self.leader.write().await;
        if let Some(session) = leader.as_ref() {
            return Ok(Arc::clone(session));
        }
        let http = self.config.http.build_client()?;
        let session = Arc::new(Session::leader(&self.config, http));
        *leader = Some(Arc::clone(&session));
        Ok(session)
    }

    /// Discovers the cluster through the leader and warms both pools up to
    /// the batch minimum for every node. Called once from `connect`.
    async fn initialize_pools(&self) -> Result<()> {
        let data = self
            .send_to_leader(Method::GET, "/db/api/status", None, true, false)
            .await?;
        let status: ClusterStatus = serde_json::from_value(data)
            .map_err(|err| ClientError::MalformedResponse(err.to_string()))?;

        let known: HashSet<String> = status
            .all_nodes()
            .iter()
            .map(|n| n.node_id.clone())
            .collect();
        self.stats.retain_nodes(&known);
        info!(
            leader = %status.node_id,
            peers = status.peers.len(),
            "discovered cluster"
        );
        *self.status.write().unwrap() = Some(status.clone());

        for node in status.all_nodes() {
            let target = ScaleTarget::from_node(&node);
            for intent in [Intent::Write, Intent::Read] {
                if let Err(err) = self.scale_up(&target, intent).await {
                    warn!(
                        node = %node.node_id,
                        intent = %intent,
                        error = %err,
                        "pool warm-up failed"
                    );
                }
            }
        }
        Ok(())
    }
}

/// A QuorumDB client: authenticated session pools over a leader/peer
/// cluster.
///
/// Cheap to clone; all clones share the same pools and background tasks.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Builds a disconnected client. Nothing touches the network until
    /// [`connect`](Client::connect).
    pub fn new(config: ClientConfig) -> Result<Self> {
        let leader_http = config.http.build_client()?;
        let leader = Arc::new(Session::leader(&config, leader_http));
        let stats = StatsMap::new(config.pool.usage_window);

        let inner = Arc::new(ClientInner {
            connected: AtomicBool::new(false),
            leader: RwLock::new(Some(leader)),
            read_pool: SessionPool::new(Intent::Read),
            write_pool: SessionPool::new(Intent::Write),
            stats,
            status: StdRwLock::new(None),
            scale_tx: StdRwLock::new(None),
            reaper: Mutex::new(None),
            config,
        });
        Ok(Self { inner })
    }

    pub(crate) fn inner(&self) -> &Arc<ClientInner> {
        &self.inner
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Authenticates with the leader and initialises the session pools.
    ///
    /// Must be the first call on a fresh client. Empty credentials fall back
    /// to the configured username/password. Fails with `AlreadyConnected`
    /// when called twice without an intervening [`close`](Client::close).
    pub async fn connect(&self, username: &str, password: &str) -> Result<()> {
        let inner = &self.inner;
        if inner.connected.load(Ordering::SeqCst) {
            return Err(ClientError::AlreadyConnected);
        }

        let leader = inner.ensure_leader_session().await?;

        let credentials = if username.is_empty() || password.is_empty() {
            ConnectRequest::new(&inner.config.username, &inner.config.password)
        } else {
            ConnectRequest::new(username, password)
        };
        let body = serde_json::to_value(credentials)?;
        let data = inner
            .send_to_leader(Method::POST, "/db/connect", Some(&body), false, false)
            .await?;
        leader.set_tokens(TokenPair::from_data(data)?);
        inner.connected.store(true, Ordering::SeqCst);
        info!(url = %leader.url(), "connected to QuorumDB leader");

        self.start_background_tasks().await;
        inner.initialize_pools().await
    }

    /// Spawns the scale worker and the reaper, once each.
    async fn start_background_tasks(&self) {
        let weak = Arc::downgrade(&self.inner);
        {
            let mut tx = self.inner.scale_tx.write().unwrap();
            if tx.is_none() {
                *tx = Some(scaler::spawn_scale_worker(weak.clone()));
            }
        }
        let mut reaper = self.inner.reaper.lock().await;
        if reaper.is_none() {
            *reaper = Some(scaler::spawn_reaper(
                weak,
                self.inner.config.pool.scale_down_interval,
            ));
        }
    }

    /// Whether `connect` succeeded and the leader session still exists.
    pub async fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
            && self.inner.leader.read().await.is_some()
    }

    /// Fetches the cluster status through the pools, falling back to the
    /// leader when no read session is available.
    pub async fn status(&self) -> Result<ClusterStatus> {
        self.inner
            .request(
                Method::GET,
                "/db/api/status",
                None,
                Intent::Read,
                false,
                true,
            )
            .await
    }

    /// URL of the current leader node.
    pub async fn leader(&self) -> Result<String> {
        let status = self.status().await?;
        status
            .all_nodes()
            .into_iter()
            .find(|n| n.is_leader)
            .map(|n| n.url)
            .ok_or_else(|| ClientError::MalformedResponse("status reports no leader".to_string()))
    }

    /// URLs of the peer nodes.
    pub async fn peers(&self) -> Result<Vec<String>> {
        let status = self.status().await?;
        Ok(status.peers.into_iter().map(|p| p.url).collect())
    }

    /// Fetches the database schema through the leader.
    pub async fn schema(&self) -> Result<Vec<SchemaEntry>> {
        let data = self
            .inner
            .send_to_leader(Method::GET, "/db/api/getschema", None, true, false)
            .await?;
        serde_json::from_value(data).map_err(|err| ClientError::MalformedResponse(err.to_string()))
    }

    /// Forces a token renewal on the leader session.
    pub async fn refresh_token(&self) -> Result<()> {
        let leader = self
            .inner
            .leader_session()
            .await
            .ok_or(ClientError::NoSessions)?;
        leader.refresh_or_reconnect(&self.inner.config).await
    }

    /// Shuts the client down: stops the reaper and the scale worker, clears
    /// both pools and drops the leader session. Idempotent; in-flight
    /// requests run to completion on their own session handles.
    pub async fn close(&self) {
        let inner = &self.inner;

        if let Some(reaper) = inner.reaper.lock().await.take() {
            reaper.stop().await;
        }
        *inner.scale_tx.write().unwrap() = None;

        inner.read_pool.clear().await;
        inner.write_pool.clear().await;
        *inner.leader.write().await = None;
        inner.connected.store(false, Ordering::SeqCst);
        info!("client closed");
    }
}
