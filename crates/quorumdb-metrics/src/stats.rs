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

use quorumdb_common::Intent;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Minimum gap between two scale-ups on the same (node, intent).
pub const SCALE_UP_DEBOUNCE: Duration = Duration::from_secs(10);

/// A node disappears from this many consecutive status refreshes before its
/// stats entry is evicted.
const MAX_MISSED_REFRESHES: u32 = 3;

#[derive(Debug)]
struct StatsInner {
    active_requests: usize,
    usage_history: VecDeque<Instant>,
    scale_up_events: u64,
    scale_down_events: u64,
    last_scale_up: Option<Instant>,
    last_scale_down: Option<Instant>,
    last_cleanup: Option<Instant>,
    missed_refreshes: u32,
}

/// Usage statistics for one (node id, intent) pair.
///
/// Entries are created lazily on first observation of a node and live until
/// shutdown or staleness eviction. The active-request counter drives
/// scale-up triggering; the usage-history ring drives the reaper's recency
/// checks and the requests-per-second estimate.
#[derive(Debug)]
pub struct NodeStats {
    node_id: String,
    intent: Intent,
    window: usize,
    inner: Mutex<StatsInner>,
}

impl NodeStats {
    fn new(node_id: impl Into<String>, intent: Intent, window: usize) -> Self {
        Self {
            node_id: node_id.into(),
            intent,
            window,
            inner: Mutex::new(StatsInner {
                active_requests: 0,
                usage_history: VecDeque::with_capacity(window),
                scale_up_events: 0,
                scale_down_events: 0,
                last_scale_up: None,
                last_scale_down: None,
                last_cleanup: None,
                missed_refreshes: 0,
            }),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }

    /// Appends a usage timestamp, trimming the ring to the window size.
    pub fn record_usage(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.usage_history.push_back(Instant::now());
        while inner.usage_history.len() > self.window {
            inner.usage_history.pop_front();
        }
    }

    /// Increments the active-request counter.
    ///
    /// Returns `true` when this request pushed the counter to the scale-up
    /// threshold and the debounce window has elapsed; the caller is expected
    /// to enqueue a scale-up. The debounce stamp is taken here so concurrent
    /// bursts trigger at most one scale-up per window.
    pub fn begin_request(&self, scale_up_threshold: usize) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.active_requests += 1;

        if inner.active_requests >= scale_up_threshold {
            let debounced = inner
                .last_scale_up
                .map(|at| at.elapsed() > SCALE_UP_DEBOUNCE)
                .unwrap_or(true);
            if debounced {
                inner.last_scale_up = Some(Instant::now());
                return true;
            }
        }
        false
    }

    /// Decrements the active-request counter, never below zero.
    pub fn end_request(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.active_requests = inner.active_requests.saturating_sub(1);
    }

    pub fn active_requests(&self) -> usize {
        self.inner.lock().unwrap().active_requests
    }

    /// Usage events recorded within the given window.
    pub fn recent_requests(&self, within: Duration) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .usage_history
            .iter()
            .filter(|t| t.elapsed() < within)
            .count()
    }

    /// Whether any usage was recorded within the given window.
    pub fn used_within(&self, within: Duration) -> bool {
        let inner = self.inner.lock().unwrap();
        inner
            .usage_history
            .back()
            .map(|t| t.elapsed() < within)
            .unwrap_or(false)
    }

    /// Records a completed scale-up event.
    pub fn mark_scale_up(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.scale_up_events += 1;
    }

    /// Records a reap that removed sessions for this node.
    pub fn mark_scale_down(&self) {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        inner.scale_down_events += 1;
        inner.last_scale_down = Some(now);
        inner.last_cleanup = Some(now);
    }

    /// Records a reap pass that inspected this node without removals.
    pub fn mark_cleanup(&self) {
        self.inner.lock().unwrap().last_cleanup = Some(Instant::now());
    }

    pub fn scale_up_events(&self) -> u64 {
        self.inner.lock().unwrap().scale_up_events
    }

    pub fn scale_down_events(&self) -> u64 {
        self.inner.lock().unwrap().scale_down_events
    }

    /// Milliseconds since the last scale-up, if any.
    pub fn last_scale_up_ms(&self) -> Option<u64> {
        let inner = self.inner.lock().unwrap();
        inner.last_scale_up.map(|t| t.elapsed().as_millis() as u64)
    }

    /// Milliseconds since the last scale-down, if any.
    pub fn last_scale_down_ms(&self) -> Option<u64> {
        let inner = self.inner.lock().unwrap();
        inner.last_scale_down.map(|t| t.elapsed().as_millis() as u64)
    }

    #[cfg(test)]
    fn backdate_last_scale_up(&self, by: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.last_scale_up = Instant::now().checked_sub(by);
    }
}

/// Registry of [`NodeStats`] keyed by (node id, intent).
///
/// Entries are created lazily and evicted only when a node has been absent
/// from [`MAX_MISSED_REFRESHES`] consecutive status refreshes, so a
/// long-lived client in a dynamic cluster does not grow without bound.
#[derive(Debug)]
pub struct StatsMap {
    window: usize,
    entries: Mutex<HashMap<(String, Intent), Arc<NodeStats>>>,
}

impl StatsMap {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fetches the stats entry for a (node, intent), creating it on first use.
    pub fn get_or_create(&self, node_id: &str, intent: Intent) -> Arc<NodeStats> {
        let mut entries = self.entries.lock().unwrap();
        entries
            .entry((node_id.to_string(), intent))
            .or_insert_with(|| Arc::new(NodeStats::new(node_id, intent, self.window)))
            .clone()
    }

    /// Looks up an entry without creating it.
    pub fn get(&self, node_id: &str, intent: Intent) -> Option<Arc<NodeStats>> {
        let entries = self.entries.lock().unwrap();
        entries.get(&(node_id.to_string(), intent)).cloned()
    }

    pub fn all(&self) -> Vec<Arc<NodeStats>> {
        self.entries.lock().unwrap().values().cloned().collect()
    }

    /// Distinct node ids with at least one stats entry.
    pub fn node_ids(&self) -> HashSet<String> {
        self.entries
            .lock()
            .unwrap()
            .keys()
            .map(|(node, _)| node.clone())
            .collect()
    }

    /// Reconciles the map against the node ids seen in the latest status
    /// refresh. Known nodes get their miss counter reset; absent nodes are
    /// evicted after three consecutive misses.
    pub fn retain_nodes(&self, known: &HashSet<String>) {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|(node_id, _), stats| {
            let mut inner = stats.inner.lock().unwrap();
            if known.contains(node_id) {
                inner.missed_refreshes = 0;
                true
            } else {
                inner.missed_refreshes += 1;
                inner.missed_refreshes < MAX_MISSED_REFRESHES
            }
        });
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_end_request() {
        let stats = NodeStats::new("n1", Intent::Read, 100);
        assert_eq!(stats.active_requests(), 0);
        stats.begin_request(10);
        stats.begin_request(10);
        assert_eq!(stats.active_requests(), 2);
        stats.end_request();
        assert_eq!(stats.active_requests(), 1);
    }

    #[test]
    fn test_end_request_never_negative() {
        let stats = NodeStats::new("n1", Intent::Read, 100);
        stats.end_request();
        stats.end_request();
        assert_eq!(stats.active_requests(), 0);
    }

    #[test]
    fn test_usage_history_trimmed_to_window() {
        let stats = NodeStats::new("n1", Intent::Read, 5);
        for _ in 0..20 {
            stats.record_usage();
        }
        assert_eq!(stats.recent_requests(Duration::from_secs(60)), 5);
    }

    #[test]
    fn test_used_within() {
        let stats = NodeStats::new("n1", Intent::Read, 10);
        assert!(!stats.used_within(Duration::from_secs(1)));
        stats.record_usage();
        assert!(stats.used_within(Duration::from_secs(1)));
    }

    #[test]
    fn test_scale_up_triggers_at_threshold() {
        let stats = NodeStats::new("n1", Intent::Read, 100);
        assert!(!stats.begin_request(3));
        assert!(!stats.begin_request(3));
        // third active request reaches the threshold
        assert!(stats.begin_request(3));
    }

    #[test]
    fn test_scale_up_debounced() {
        let stats = NodeStats::new("n1", Intent::Read, 100);
        for _ in 0..2 {
            stats.begin_request(3);
        }
        assert!(stats.begin_request(3));
        // still above threshold, but inside the debounce window
        assert!(!stats.begin_request(3));

        stats.backdate_last_scale_up(SCALE_UP_DEBOUNCE + Duration::from_secs(1));
        assert!(stats.begin_request(3));
    }

    #[test]
    fn test_scale_event_counters() {
        let stats = NodeStats::new("n1", Intent::Write, 100);
        assert_eq!(stats.scale_up_events(), 0);
        stats.mark_scale_up();
        stats.mark_scale_up();
        stats.mark_scale_down();
        assert_eq!(stats.scale_up_events(), 2);
        assert_eq!(stats.scale_down_events(), 1);
        assert!(stats.last_scale_down_ms().is_some());
    }

    #[test]
    fn test_map_lazily_creates_and_reuses() {
        let map = StatsMap::new(100);
        let a = map.get_or_create("n1", Intent::Read);
        let b = map.get_or_create("n1", Intent::Read);
        assert!(Arc::ptr_eq(&a, &b));

        // same node, different intent is a distinct entry
        let c = map.get_or_create("n1", Intent::Write);
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(map.all().len(), 2);
    }

    #[test]
    fn test_map_get_does_not_create() {
        let map = StatsMap::new(100);
        assert!(map.get("ghost", Intent::Read).is_none());
        map.get_or_create("real", Intent::Read);
        assert!(map.get("real", Intent::Read).is_some());
    }

    #[test]
    fn test_retain_nodes_evicts_after_three_misses() {
        let map = StatsMap::new(100);
        map.get_or_create("gone", Intent::Read);
        map.get_or_create("kept", Intent::Read);

        let known: HashSet<String> = ["kept".to_string()].into_iter().collect();
        map.retain_nodes(&known);
        map.retain_nodes(&known);
        assert!(map.get("gone", Intent::Read).is_some());
        map.retain_nodes(&known);
        assert!(map.get("gone", Intent::Read).is_none());
        assert!(map.get("kept", Intent::Read).is_some());
    }

    #[test]
    fn test_retain_nodes_resets_miss_counter() {
        let map = StatsMap::new(100);
        map.get_or_create("flappy", Intent::Read);

        let absent: HashSet<String> = HashSet::new();
        let present: HashSet<String> = ["flappy".to_string()].into_iter().collect();

        map.retain_nodes(&absent);
        map.retain_nodes(&absent);
        map.retain_nodes(&present); // reappears, counter resets
        map.retain_nodes(&absent);
        map.retain_nodes(&absent);
        assert!(map.get("flappy", Intent::Read).is_some());
    }

    #[test]
    fn test_concurrent_begin_end() {
        use std::thread;

        let stats = Arc::new(NodeStats::new("n1", Intent::Read, 100));
        let mut handles = vec![];
        for _ in 0..8 {
            let stats = Arc::clone(&stats);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    stats.begin_request(usize::MAX);
                    stats.end_request();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(stats.active_requests(), 0);
    }
}
