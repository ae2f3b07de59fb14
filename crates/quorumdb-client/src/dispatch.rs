//! The routing primitive every API call funnels through.
//!
//! One dispatch = pick a session by intent, record usage, exchange, and
//! recover where the contract allows: a 401 with auto-refresh buys exactly
//! one refresh-and-retry, and a failure on a non-leader session with
//! fallback enabled buys exactly one leader retry (with fallback disabled on
//! the retry, so loops are impossible). Everything else surfaces, wrapped
//! with the phase that failed.

use crate::client::{Client, ClientInner};
use crate::scaler::{ScaleRequest, ScaleTarget};
use crate::session::Session;
use quorumdb_common::protocol::error::{ClientError, Result};
use quorumdb_common::Intent;
use quorumdb_metrics::NodeStats;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Decrements the active-request counter when the request finishes,
/// whichever way it finishes. The decrement is pushed onto the runtime so
/// request completion never blocks on stats contention.
struct RequestGuard {
    stats: Arc<NodeStats>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        let stats = Arc::clone(&self.stats);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { stats.end_request() });
            }
            Err(_) => stats.end_request(),
        }
    }
}

impl ClientInner {
    pub(crate) fn pool(&self, intent: Intent) -> &crate::pool::SessionPool {
        match intent {
            Intent::Read => &self.read_pool,
            Intent::Write => &self.write_pool,
        }
    }

    /// Dispatches one request: session selection, stats bookkeeping, the
    /// HTTP exchange and the recovery paths. Returns the envelope `data`.
    pub(crate) async fn dispatch(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
        intent: Intent,
        auto_refresh: bool,
        fallback: bool,
    ) -> Result<Value> {
        let session = match self.pool(intent).take_next().await {
            Ok(session) => session,
            Err(ClientError::NoSessions) if fallback => {
                debug!(intent = %intent, "pool empty, using leader session directly");
                self.leader_session().await.ok_or(ClientError::NoSessions)?
            }
            Err(err) => return Err(err),
        };

        let stats = self.stats.get_or_create(session.node_id(), intent);
        let _guard = RequestGuard {
            stats: Arc::clone(&stats),
        };

        // usage recording and scale-up triggering happen off the request path
        {
            let stats = Arc::clone(&stats);
            tokio::spawn(async move { stats.record_usage() });
        }
        {
            let stats = Arc::clone(&stats);
            let threshold = self.config.pool.scale_up_threshold;
            let target = ScaleTarget::from_session(&session);
            let scale_tx = self.scale_sender();
            tokio::spawn(async move {
                if stats.begin_request(threshold) {
                    let Some(tx) = scale_tx else { return };
                    if tx.try_send(ScaleRequest { target, intent }).is_err() {
                        debug!("scale queue full, dropping trigger");
                    }
                }
            });
        }

        self.send_with_session(&session, method, endpoint, body.as_ref(), true, auto_refresh, fallback)
            .await
    }

    /// Dispatches and decodes the envelope `data` into the caller's type.
    pub(crate) async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
        intent: Intent,
        auto_refresh: bool,
        fallback: bool,
    ) -> Result<T> {
        let data = self
            .dispatch(method, endpoint, body, intent, auto_refresh, fallback)
            .await?;
        serde_json::from_value(data).map_err(|err| ClientError::MalformedResponse(err.to_string()))
    }

    /// Sends through a specific session, with the 401-refresh and
    /// leader-fallback recovery paths.
    pub(crate) async fn send_with_session(
        &self,
        session: &Arc<Session>,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
        with_token: bool,
        auto_refresh: bool,
        fallback: bool,
    ) -> Result<Value> {
        // a token-less call has nothing to refresh
        let auto_refresh = auto_refresh && with_token;
        session.ensure_token(with_token)?;

        // proactive renewal once the pair outlives its TTL; best-effort, the
        // 401 path still covers a missed expiry
        if with_token && session.token_expired(self.config.pool.connection_ttl) {
            if let Err(err) = session.refresh_or_reconnect(&self.config).await {
                debug!(node = %session.node_id(), error = %err, "TTL refresh failed");
            }
        }

        match self
            .exchange(session, method.clone(), endpoint, body, with_token, auto_refresh)
            .await
        {
            Ok(data) => Ok(data),
            Err(err) if fallback && !session.is_leader() => {
                warn!(
                    node = %session.node_id(),
                    error = %err,
                    "request failed, falling back to leader"
                );
                self.send_to_leader(method, endpoint, body, with_token, auto_refresh)
                    .await
                    .map_err(ClientError::fallback)
            }
            Err(err) => Err(err),
        }
    }

    /// Sends through the leader session. No fallback: this *is* the
    /// fallback.
    pub(crate) async fn send_to_leader(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
        with_token: bool,
        auto_refresh: bool,
    ) -> Result<Value> {
        let leader = self.leader_session().await.ok_or(ClientError::NoSessions)?;
        let auto_refresh = auto_refresh && with_token;
        leader.ensure_token(with_token)?;
        self.exchange(&leader, method, endpoint, body, with_token, auto_refresh)
            .await
    }

    /// One HTTP exchange plus the single refresh-and-retry a 401 allows.
    async fn exchange(
        &self,
        session: &Arc<Session>,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
        with_token: bool,
        auto_refresh: bool,
    ) -> Result<Value> {
        let response = session
            .send(&self.config, method.clone(), endpoint, body, with_token)
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED && auto_refresh {
            debug!(node = %session.node_id(), "401, refreshing token and retrying once");
            session.refresh_or_reconnect(&self.config).await?;
            let retry = session
                .send(&self.config, method, endpoint, body, with_token)
                .await
                .map_err(|err| ClientError::after_refresh(err.into()))?;
            return Session::decode_envelope(retry)
                .await
                .map_err(ClientError::after_refresh);
        }

        Session::decode_envelope(response).await
    }
}

impl Client {
    /// Low-level escape hatch: dispatch a request against an arbitrary
    /// endpoint and decode the envelope `data` into `T`.
    ///
    /// `auto_refresh` enables the single 401-refresh-retry; `fallback`
    /// enables the single leader retry when a peer fails.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
        intent: Intent,
        auto_refresh: bool,
        fallback: bool,
    ) -> Result<T> {
        self.inner()
            .request(method, endpoint, body, intent, auto_refresh, fallback)
            .await
    }
}
