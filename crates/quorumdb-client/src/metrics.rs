//! Snapshot assembly: pool sizes + per-node stats → reportable metrics.

use crate::client::Client;
use quorumdb_common::protocol::status::ClusterStatus;
use quorumdb_common::Intent;
use quorumdb_metrics::{NodePoolMetrics, PoolHealth, PoolMetrics};
use std::collections::HashSet;
use std::time::Duration;

const RECENT_WINDOW: Duration = Duration::from_secs(60);

fn newer(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

impl Client {
    /// Aggregate metrics for both pools plus the leader bootstrap session.
    pub async fn pool_metrics(&self) -> PoolMetrics {
        let inner = self.inner();
        let leader = inner.leader_session().await;
        let read_sessions = inner.read_pool.size().await;
        let write_sessions = inner.write_pool.size().await;

        let mut node_ids: HashSet<String> = HashSet::new();
        if let Some(leader) = &leader {
            node_ids.insert(leader.node_id().to_string());
        }
        node_ids.extend(inner.read_pool.node_ids().await);
        node_ids.extend(inner.write_pool.node_ids().await);

        let status = inner.status.read().unwrap().clone();

        let mut metrics = PoolMetrics {
            total_sessions: read_sessions + write_sessions + usize::from(leader.is_some()),
            read_sessions,
            write_sessions,
            ..Default::default()
        };

        let mut recent_total = 0;
        for node_id in node_ids {
            let node = self.collect_node_metrics(&node_id, status.as_ref()).await;
            recent_total += node.recent_requests;
            metrics.active_requests += node.active_requests;
            metrics.scale_up_events += node.scale_up_events;
            metrics.scale_down_events += node.scale_down_events;
            metrics.nodes.insert(node_id, node);
        }
        metrics.requests_per_second = recent_total as f64 / RECENT_WINDOW.as_secs_f64();
        metrics
    }

    /// Detailed metrics for one node, or `None` when the node holds no
    /// sessions in either pool.
    pub async fn node_metrics(&self, node_id: &str) -> Option<NodePoolMetrics> {
        let inner = self.inner();
        let held = inner.read_pool.size_for(node_id).await + inner.write_pool.size_for(node_id).await;
        if held == 0 {
            return None;
        }
        let status = inner.status.read().unwrap().clone();
        Some(self.collect_node_metrics(node_id, status.as_ref()).await)
    }

    async fn collect_node_metrics(
        &self,
        node_id: &str,
        status: Option<&ClusterStatus>,
    ) -> NodePoolMetrics {
        let inner = self.inner();
        let idle_timeout = inner.config.pool.idle_timeout;

        let (url, mode) = status
            .map(|s| {
                if s.node_id == node_id {
                    (s.url.clone(), s.mode.to_string())
                } else {
                    s.peers
                        .iter()
                        .find(|p| p.node_id == node_id)
                        .map(|p| (p.url.clone(), p.mode.to_string()))
                        .unwrap_or_default()
                }
            })
            .unwrap_or_default();

        let read = inner.read_pool.sessions_for(node_id).await;
        let write = inner.write_pool.sessions_for(node_id).await;
        let idle_sessions = read
            .iter()
            .chain(write.iter())
            .filter(|s| s.idle_for() > idle_timeout)
            .count();

        let mut node = NodePoolMetrics {
            node_id: node_id.to_string(),
            url,
            mode,
            read_sessions: read.len(),
            write_sessions: write.len(),
            idle_sessions,
            ..Default::default()
        };

        for intent in [Intent::Read, Intent::Write] {
            if let Some(stats) = inner.stats.get(node_id, intent) {
                node.active_requests += stats.active_requests();
                node.recent_requests += stats.recent_requests(RECENT_WINDOW);
                node.scale_up_events += stats.scale_up_events();
                node.scale_down_events += stats.scale_down_events();
                node.last_scale_up_ms = newer(node.last_scale_up_ms, stats.last_scale_up_ms());
                node.last_scale_down_ms =
                    newer(node.last_scale_down_ms, stats.last_scale_down_ms());
            }
        }
        node
    }

    /// Simplified health view of the pools.
    pub async fn pool_health(&self) -> PoolHealth {
        let inner = self.inner();
        let leader = inner.leader_session().await;

        let read = inner.read_pool.all_sessions().await;
        let write = inner.write_pool.all_sessions().await;

        let mut active_requests = 0;
        for stats in inner.stats.all() {
            active_requests += stats.active_requests();
        }

        let oldest_session_age_ms = leader
            .iter()
            .chain(read.iter())
            .chain(write.iter())
            .map(|s| s.age().as_millis() as u64)
            .max();

        let mut nodes_with_sessions: HashSet<String> = HashSet::new();
        for session in read.iter().chain(write.iter()) {
            nodes_with_sessions.insert(session.node_id().to_string());
        }

        let node_count = inner
            .status
            .read()
            .unwrap()
            .as_ref()
            .map(|s| 1 + s.peers.len())
            .unwrap_or(0);

        PoolHealth {
            has_leader: leader.is_some(),
            read_sessions: read.len(),
            write_sessions: write.len(),
            active_requests,
            oldest_session_age_ms,
            node_count,
            nodes_with_sessions: nodes_with_sessions.len(),
            full_node_coverage: node_count > 0 && nodes_with_sessions.len() == node_count,
        }
    }
}
