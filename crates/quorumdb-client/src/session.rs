//! One authenticated channel to one node.
//!
//! A session does not hold a socket open; it carries a token pair and an
//! HTTP transport, so the pool above it is a pool of credentials that spares
//! the caller a `/db/connect` round-trip per request. Identity (URL, node
//! id, mode, leader flag) is fixed at creation; only the tokens and the
//! bookkeeping timestamps change afterwards.

use quorumdb_common::config::ClientConfig;
use quorumdb_common::protocol::error::{ClientError, Result};
use quorumdb_common::protocol::status::{NodeDescriptor, NodeMode, LEADER_NODE_ID};
use quorumdb_common::protocol::{ConnectRequest, Envelope, RefreshRequest, TokenPair};
use reqwest::Method;
use serde_json::Value;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;

/// An authenticated HTTP-bearing handle to one node.
#[derive(Debug)]
pub struct Session {
    url: String,
    node_id: String,
    mode: NodeMode,
    is_leader: bool,
    http: reqwest::Client,
    tokens: RwLock<Option<TokenPair>>,
    created: Instant,
    last_used: Mutex<Instant>,
    last_refresh: Mutex<Instant>,
}

impl Session {
    /// Creates a session for a node, not yet authenticated.
    ///
    /// Empty `url`/`node_id` fall back to the configured server URL and the
    /// reserved leader id, matching what bootstrap knows before discovery.
    pub fn new(
        config: &ClientConfig,
        url: &str,
        node_id: &str,
        mode: NodeMode,
        is_leader: bool,
        http: reqwest::Client,
    ) -> Self {
        let url = if url.is_empty() {
            config.server_url.clone()
        } else {
            url.to_string()
        };
        let node_id = if node_id.is_empty() {
            LEADER_NODE_ID.to_string()
        } else {
            node_id.to_string()
        };
        let now = Instant::now();

        Self {
            url,
            node_id,
            mode,
            is_leader,
            http,
            tokens: RwLock::new(None),
            created: now,
            last_used: Mutex::new(now),
            last_refresh: Mutex::new(now),
        }
    }

    /// Session for a discovered node.
    pub fn for_node(config: &ClientConfig, node: &NodeDescriptor, http: reqwest::Client) -> Self {
        Self::new(config, &node.url, &node.node_id, node.mode, node.is_leader, http)
    }

    /// The bootstrap session pointed at the configured server URL, assumed
    /// to be the leader until discovery says otherwise.
    pub fn leader(config: &ClientConfig, http: reqwest::Client) -> Self {
        Self::new(config, "", "", NodeMode::ReadWrite, true, http)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn mode(&self) -> NodeMode {
        self.mode
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader
    }

    pub fn has_token(&self) -> bool {
        self.tokens.read().unwrap().is_some()
    }

    /// Fails with `NotAuthenticated` when the call needs a token this
    /// session does not have.
    pub fn ensure_token(&self, requires_auth: bool) -> Result<()> {
        if requires_auth && !self.has_token() {
            return Err(ClientError::NotAuthenticated(self.node_id.clone()));
        }
        Ok(())
    }

    fn access_token(&self) -> Option<String> {
        self.tokens.read().unwrap().as_ref().map(|t| t.token.clone())
    }

    fn refresh_token(&self) -> Option<String> {
        self.tokens
            .read()
            .unwrap()
            .as_ref()
            .map(|t| t.refresh.clone())
    }

    /// Installs a new token pair, stamping `last_refresh`.
    pub fn set_tokens(&self, pair: TokenPair) {
        *self.tokens.write().unwrap() = Some(pair);
        *self.last_refresh.lock().unwrap() = Instant::now();
    }

    pub fn clear_tokens(&self) {
        *self.tokens.write().unwrap() = None;
    }

    /// Marks the session as just used.
    pub fn touch(&self) {
        *self.last_used.lock().unwrap() = Instant::now();
    }

    /// Time since the session last served a request.
    pub fn idle_for(&self) -> Duration {
        self.last_used.lock().unwrap().elapsed()
    }

    /// Time since the session was created.
    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    /// Whether the token pair has outlived the configured session TTL.
    pub fn token_expired(&self, ttl: Duration) -> bool {
        self.last_refresh.lock().unwrap().elapsed() > ttl
    }

    /// Performs a single HTTP exchange on this session's transport.
    ///
    /// Sets `API_KEY`, `CLIENT_ID` and `Content-Type: application/json` on
    /// every request, plus `Authorization: Bearer <token>` when `with_token`
    /// is set and a token is present.
    pub async fn send(
        &self,
        config: &ClientConfig,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
        with_token: bool,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.url, endpoint);
        let mut request = self
            .http
            .request(method, url)
            .header("Content-Type", "application/json")
            .header("API_KEY", &config.api_key)
            .header("CLIENT_ID", &config.client_id);

        if with_token {
            if let Some(token) = self.access_token() {
                request = request.bearer_auth(token);
            }
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        Ok(request.send().await?)
    }

    /// Consumes a response, decodes the standard envelope and returns its
    /// `data` on status 200.
    pub async fn decode_envelope(response: reqwest::Response) -> Result<Value> {
        let envelope: Envelope = response.json().await?;
        envelope.into_data()
    }

    /// Obtains a fresh token pair via `/db/connect` with the configured
    /// credentials. Used for new pool sessions and as the refresh fallback.
    pub async fn authenticate(&self, config: &ClientConfig) -> Result<()> {
        let body = serde_json::to_value(ConnectRequest::new(
            &config.username,
            &config.password,
        ))?;
        let response = self
            .send(config, Method::POST, "/db/connect", Some(&body), false)
            .await?;
        let data = Self::decode_envelope(response).await?;
        self.set_tokens(TokenPair::from_data(data)?);
        debug!(node = %self.node_id, url = %self.url, "session authenticated");
        Ok(())
    }

    /// Renews the access token via `/db/refresh` using the refresh token.
    async fn refresh(&self, config: &ClientConfig) -> Result<()> {
        let refresh = self
            .refresh_token()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ClientError::NotAuthenticated(self.node_id.clone()))?;

        let body = serde_json::to_value(RefreshRequest::new(refresh))?;
        let response = self
            .send(config, Method::POST, "/db/refresh", Some(&body), false)
            .await?;
        let data = Self::decode_envelope(response).await?;
        self.set_tokens(TokenPair::from_data(data)?);
        Ok(())
    }

    /// Renews this session's tokens: `/db/refresh` first, then a full
    /// `/db/connect` with the stored credentials if the refresh is rejected.
    /// Fails with `AuthFailed` only when both attempts fail.
    pub async fn refresh_or_reconnect(&self, config: &ClientConfig) -> Result<()> {
        match self.refresh(config).await {
            Ok(()) => Ok(()),
            Err(err) => {
                debug!(
                    node = %self.node_id,
                    error = %err,
                    "token refresh failed, falling back to reconnect"
                );
                self.authenticate(config)
                    .await
                    .map_err(|_| ClientError::AuthFailed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ClientConfig {
        ClientConfig::default().with_server_url("http://127.0.0.1:9")
    }

    fn test_session() -> Session {
        Session::leader(&test_config(), reqwest::Client::new())
    }

    #[test]
    fn test_leader_session_defaults() {
        let session = test_session();
        assert_eq!(session.url(), "http://127.0.0.1:9");
        assert_eq!(session.node_id(), LEADER_NODE_ID);
        assert!(session.is_leader());
        assert_eq!(session.mode(), NodeMode::ReadWrite);
        assert!(!session.has_token());
    }

    #[test]
    fn test_for_node_keeps_identity() {
        let node = NodeDescriptor {
            url: "http://10.0.0.2:8080".to_string(),
            node_id: "2".to_string(),
            mode: NodeMode::Read,
            is_leader: false,
            max_pool: 10,
        };
        let session = Session::for_node(&test_config(), &node, reqwest::Client::new());
        assert_eq!(session.url(), "http://10.0.0.2:8080");
        assert_eq!(session.node_id(), "2");
        assert!(!session.is_leader());
    }

    #[test]
    fn test_ensure_token() {
        let session = test_session();
        assert!(session.ensure_token(false).is_ok());
        match session.ensure_token(true) {
            Err(ClientError::NotAuthenticated(node)) => assert_eq!(node, "0"),
            other => panic!("expected NotAuthenticated, got {:?}", other),
        }

        session.set_tokens(TokenPair::new("a", "b"));
        assert!(session.ensure_token(true).is_ok());
    }

    #[test]
    fn test_set_and_clear_tokens() {
        let session = test_session();
        session.set_tokens(TokenPair::new("a", "b"));
        assert!(session.has_token());
        assert_eq!(session.access_token().as_deref(), Some("a"));
        assert_eq!(session.refresh_token().as_deref(), Some("b"));

        session.clear_tokens();
        assert!(!session.has_token());
        assert!(session.access_token().is_none());
    }

    #[test]
    fn test_token_expiry_uses_last_refresh() {
        let session = test_session();
        assert!(!session.token_expired(Duration::from_secs(3600)));
        std::thread::sleep(Duration::from_millis(2));
        assert!(session.token_expired(Duration::ZERO));

        session.set_tokens(TokenPair::new("a", "b"));
        assert!(!session.token_expired(Duration::from_secs(1)));
    }

    #[test]
    fn test_touch_advances_last_used() {
        let session = test_session();
        std::thread::sleep(Duration::from_millis(5));
        let before = session.idle_for();
        session.touch();
        assert!(session.idle_for() < before);
    }
}
