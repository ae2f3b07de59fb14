//! Cluster status and node discovery types.
//!
//! `GET /db/api/status` on any node describes that node plus its view of the
//! rest of the cluster. The client calls it once through the leader during
//! bootstrap and caches the result for pool warm-up and per-node ceilings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Node id the client assigns to the leader before discovery.
pub const LEADER_NODE_ID: &str = "0";

/// What a node is willing to serve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeMode {
    #[serde(rename = "r")]
    Read,
    #[serde(rename = "w")]
    Write,
    #[serde(rename = "rw")]
    #[default]
    ReadWrite,
}

impl NodeMode {
    pub fn can_read(self) -> bool {
        matches!(self, NodeMode::Read | NodeMode::ReadWrite)
    }

    pub fn can_write(self) -> bool {
        matches!(self, NodeMode::Write | NodeMode::ReadWrite)
    }
}

impl fmt::Display for NodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeMode::Read => "r",
            NodeMode::Write => "w",
            NodeMode::ReadWrite => "rw",
        };
        f.write_str(s)
    }
}

/// One node as reported by the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDescriptor {
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "NodeID")]
    pub node_id: String,
    #[serde(rename = "Mode", default)]
    pub mode: NodeMode,
    #[serde(rename = "IsLeader", default)]
    pub is_leader: bool,
    /// Per-node ceiling on read sessions the node is willing to hold.
    #[serde(rename = "MaxPool", default)]
    pub max_pool: usize,
}

/// Full cluster view: the answering node plus its peers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterStatus {
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "NodeID")]
    pub node_id: String,
    #[serde(rename = "Mode", default)]
    pub mode: NodeMode,
    #[serde(rename = "IsLeader", default)]
    pub is_leader: bool,
    #[serde(rename = "MaxPool", default)]
    pub max_pool: usize,
    #[serde(rename = "Peers", default)]
    pub peers: Vec<NodeDescriptor>,
}

impl ClusterStatus {
    /// The answering node as a [`NodeDescriptor`].
    pub fn self_node(&self) -> NodeDescriptor {
        NodeDescriptor {
            url: self.url.clone(),
            node_id: self.node_id.clone(),
            mode: self.mode,
            is_leader: self.is_leader,
            max_pool: self.max_pool,
        }
    }

    /// All known nodes, the answering node first.
    pub fn all_nodes(&self) -> Vec<NodeDescriptor> {
        let mut nodes = vec![self.self_node()];
        nodes.extend(self.peers.iter().cloned());
        nodes
    }

    /// Looks up the read-session ceiling (`MaxPool`) for a node id.
    pub fn max_pool_for(&self, node_id: &str) -> Option<usize> {
        if node_id == self.node_id {
            return Some(self.max_pool);
        }
        self.peers
            .iter()
            .find(|p| p.node_id == node_id)
            .map(|p| p.max_pool)
    }
}
