//! In-process mock QuorumDB cluster for integration tests.
//!
//! Each `MockNode` is an axum server on a loopback port implementing the
//! endpoints the client talks to, with atomic call counters and failure
//! switches so tests can script token expiry, refresh rejection and node
//! outages.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use quorumdb_common::protocol::{Envelope, NodeDescriptor};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

pub struct NodeState {
    pub node_id: String,
    pub mode: String,
    pub is_leader: bool,
    pub max_pool: usize,
    url: Mutex<String>,
    peers: Mutex<Vec<NodeDescriptor>>,

    token_counter: AtomicUsize,
    pub connect_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub query_calls: AtomicUsize,
    pub exec_calls: AtomicUsize,

    /// Reject this many upcoming query requests with HTTP 401.
    pub expire_queries: AtomicUsize,
    pub fail_refresh: AtomicBool,
    pub fail_connect: AtomicBool,
    /// Artificial delay applied to query requests, in milliseconds.
    pub query_delay_ms: AtomicUsize,
    /// Rows returned per query.
    pub query_rows: AtomicUsize,
}

impl NodeState {
    fn new(node_id: &str, mode: &str, is_leader: bool, max_pool: usize) -> Self {
        Self {
            node_id: node_id.to_string(),
            mode: mode.to_string(),
            is_leader,
            max_pool,
            url: Mutex::new(String::new()),
            peers: Mutex::new(Vec::new()),
            token_counter: AtomicUsize::new(0),
            connect_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
            exec_calls: AtomicUsize::new(0),
            expire_queries: AtomicUsize::new(0),
            fail_refresh: AtomicBool::new(false),
            fail_connect: AtomicBool::new(false),
            query_delay_ms: AtomicUsize::new(0),
            query_rows: AtomicUsize::new(1),
        }
    }

    fn issue_tokens(&self) -> Value {
        let n = self.token_counter.fetch_add(1, Ordering::SeqCst);
        json!({
            "token": format!("tok-{}-{}", self.node_id, n),
            "refresh": format!("ref-{}-{}", self.node_id, n),
            "expires_in": 3600
        })
    }

    fn records(&self) -> Vec<Value> {
        let rows = self.query_rows.load(Ordering::SeqCst);
        (0..rows)
            .map(|i| {
                json!({
                    "table_name": "users",
                    "data": {"row": i, "served_by": self.node_id}
                })
            })
            .collect()
    }
}

async fn connect(State(state): State<Arc<NodeState>>) -> (StatusCode, Json<Envelope>) {
    state.connect_calls.fetch_add(1, Ordering::SeqCst);
    if state.fail_connect.load(Ordering::SeqCst) {
        return (
            StatusCode::OK,
            Json(Envelope::error(500, "connections disabled")),
        );
    }
    (StatusCode::OK, Json(Envelope::ok(state.issue_tokens())))
}

async fn refresh(State(state): State<Arc<NodeState>>) -> (StatusCode, Json<Envelope>) {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    if state.fail_refresh.load(Ordering::SeqCst) {
        return (
            StatusCode::OK,
            Json(Envelope::error(500, "refresh token rejected")),
        );
    }
    (StatusCode::OK, Json(Envelope::ok(state.issue_tokens())))
}

async fn status(State(state): State<Arc<NodeState>>) -> (StatusCode, Json<Envelope>) {
    let peers: Vec<Value> = state
        .peers
        .lock()
        .unwrap()
        .iter()
        .map(|p| serde_json::to_value(p).unwrap())
        .collect();
    let body = json!({
        "URL": state.url.lock().unwrap().clone(),
        "NodeID": state.node_id,
        "Mode": state.mode,
        "IsLeader": state.is_leader,
        "MaxPool": state.max_pool,
        "Peers": peers
    });
    (StatusCode::OK, Json(Envelope::ok(body)))
}

async fn expire_or_delay(state: &NodeState) -> Option<(StatusCode, Json<Envelope>)> {
    let expired = state
        .expire_queries
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if expired {
        return Some((
            StatusCode::UNAUTHORIZED,
            Json(Envelope::error(401, "token expired")),
        ));
    }
    let delay = state.query_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay as u64)).await;
    }
    None
}

async fn query(State(state): State<Arc<NodeState>>) -> (StatusCode, Json<Envelope>) {
    if let Some(response) = expire_or_delay(&state).await {
        return response;
    }
    state.query_calls.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::OK,
        Json(Envelope::ok(json!({"records": state.records()}))),
    )
}

async fn query_sql(State(state): State<Arc<NodeState>>) -> (StatusCode, Json<Envelope>) {
    if let Some(response) = expire_or_delay(&state).await {
        return response;
    }
    state.query_calls.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::OK,
        Json(Envelope::ok(json!([{"records": state.records()}]))),
    )
}

async fn exec_sql(State(state): State<Arc<NodeState>>) -> (StatusCode, Json<Envelope>) {
    state.exec_calls.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::OK,
        Json(Envelope::ok(
            json!({"results": [{"rows_affected": 1, "last_insert_id": 1}]}),
        )),
    )
}

async fn get_schema() -> (StatusCode, Json<Envelope>) {
    (
        StatusCode::OK,
        Json(Envelope::ok(json!([
            {"name": "users", "type": "table", "sql": "CREATE TABLE users (id INTEGER)"}
        ]))),
    )
}

pub struct MockNode {
    pub state: Arc<NodeState>,
    addr: SocketAddr,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl MockNode {
    pub async fn start(node_id: &str, mode: &str, is_leader: bool, max_pool: usize) -> Self {
        let state = Arc::new(NodeState::new(node_id, mode, is_leader, max_pool));

        let app = Router::new()
            .route("/db/connect", post(connect))
            .route("/db/refresh", post(refresh))
            .route("/db/api/status", get(status))
            .route("/db/api/query", post(query))
            .route("/db/api/querysql", post(query_sql))
            .route("/db/api/sql", post(exec_sql))
            .route("/db/api/insert", post(exec_sql))
            .route("/db/api/getschema", get(get_schema))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        *state.url.lock().unwrap() = format!("http://{}", addr);

        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await;
        });

        Self {
            state,
            addr,
            shutdown: Mutex::new(Some(tx)),
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn descriptor(&self) -> NodeDescriptor {
        serde_json::from_value(json!({
            "URL": self.url(),
            "NodeID": self.state.node_id,
            "Mode": self.state.mode,
            "IsLeader": self.state.is_leader,
            "MaxPool": self.state.max_pool
        }))
        .unwrap()
    }

    pub fn add_peer(&self, peer: NodeDescriptor) {
        self.state.peers.lock().unwrap().push(peer);
    }

    /// Stops the server; subsequent requests get connection refused.
    pub fn shut_down(&self) {
        if let Some(tx) = self.shutdown.lock().unwrap().take() {
            let _ = tx.send(());
        }
    }
}

/// Starts a leader plus `peer_count` read-only peers. Every node knows the
/// full topology, so any of them can answer a status request.
pub async fn start_cluster(peer_count: usize, max_pool: usize) -> (MockNode, Vec<MockNode>) {
    let leader = MockNode::start("1", "rw", true, max_pool).await;
    let mut peers = Vec::new();
    for i in 0..peer_count {
        let peer = MockNode::start(&format!("{}", i + 2), "r", false, max_pool).await;
        peers.push(peer);
    }

    for peer in &peers {
        leader.add_peer(peer.descriptor());
    }
    for peer in &peers {
        peer.add_peer(leader.descriptor());
        for other in &peers {
            if other.state.node_id != peer.state.node_id {
                peer.add_peer(other.descriptor());
            }
        }
    }
    (leader, peers)
}
