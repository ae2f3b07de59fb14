// Copyright 2025 QuorumDB Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-node pool metrics at snapshot time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodePoolMetrics {
    pub node_id: String,
    pub url: String,
    pub mode: String,
    pub read_sessions: usize,
    pub write_sessions: usize,
    pub active_requests: usize,
    pub idle_sessions: usize,
    /// Usage events recorded in the last minute.
    pub recent_requests: usize,
    pub scale_up_events: u64,
    pub scale_down_events: u64,
    /// Milliseconds since the last scale-up, if one happened.
    pub last_scale_up_ms: Option<u64>,
    /// Milliseconds since the last scale-down, if one happened.
    pub last_scale_down_ms: Option<u64>,
}

/// Aggregate pool metrics across the whole client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolMetrics {
    /// Sessions across both pools plus the leader bootstrap session.
    pub total_sessions: usize,
    pub read_sessions: usize,
    pub write_sessions: usize,
    pub active_requests: usize,
    pub scale_up_events: u64,
    pub scale_down_events: u64,
    /// Approximate request rate from the last minute of usage history.
    pub requests_per_second: f64,
    pub nodes: HashMap<String, NodePoolMetrics>,
}

/// Simplified health view of the pools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolHealth {
    pub has_leader: bool,
    pub read_sessions: usize,
    pub write_sessions: usize,
    pub active_requests: usize,
    pub oldest_session_age_ms: Option<u64>,
    /// Nodes the last status refresh reported.
    pub node_count: usize,
    /// Nodes currently holding at least one session.
    pub nodes_with_sessions: usize,
    pub full_node_coverage: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_metrics_serialization() {
        let mut metrics = PoolMetrics {
            total_sessions: 13,
            read_sessions: 6,
            write_sessions: 6,
            active_requests: 2,
            scale_up_events: 4,
            scale_down_events: 1,
            requests_per_second: 1.5,
            nodes: HashMap::new(),
        };
        metrics.nodes.insert(
            "1".to_string(),
            NodePoolMetrics {
                node_id: "1".to_string(),
                url: "http://127.0.0.1:8080".to_string(),
                mode: "rw".to_string(),
                read_sessions: 3,
                write_sessions: 3,
                ..Default::default()
            },
        );

        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["total_sessions"], 13);
        assert_eq!(json["nodes"]["1"]["read_sessions"], 3);

        let back: PoolMetrics = serde_json::from_value(json).unwrap();
        assert_eq!(back.scale_up_events, 4);
    }

    #[test]
    fn test_pool_health_defaults() {
        let health = PoolHealth::default();
        assert!(!health.has_leader);
        assert!(health.oldest_session_age_ms.is_none());
        assert!(!health.full_node_coverage);
    }
}
