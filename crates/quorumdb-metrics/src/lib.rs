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

//! QuorumDB Client Metrics
//!
//! This crate tracks per-node usage statistics for the QuorumDB session
//! pools and turns them into serialisable snapshots.
//!
//! # Architecture
//!
//! - [`NodeStats`]: one entry per (node id, intent): active-request
//!   counter, a bounded ring of recent usage timestamps, scale event
//!   counters and the scale-up debounce stamp
//! - [`StatsMap`]: the lazily-populated registry of [`NodeStats`] entries,
//!   with staleness eviction for nodes that disappear from the cluster
//! - [`PoolMetrics`] / [`NodePoolMetrics`] / [`PoolHealth`]: snapshot
//!   structures assembled by the client's metrics reporter
//!
//! # Thread Safety
//!
//! Each stats entry carries its own mutex, so request bookkeeping on one
//! node never contends with another node's. The map itself takes a separate
//! lock only on entry creation and eviction.
//!
//! # Usage Example
//!
//! ```
//! use quorumdb_metrics::StatsMap;
//! use quorumdb_common::Intent;
//!
//! let stats = StatsMap::new(100);
//! let entry = stats.get_or_create("node-1", Intent::Read);
//!
//! entry.record_usage();
//! let triggered = entry.begin_request(10);
//! assert!(!triggered); // one active request, threshold is 10
//! entry.end_request();
//! ```

mod snapshot;
mod stats;

pub use snapshot::{NodePoolMetrics, PoolHealth, PoolMetrics};
pub use stats::{NodeStats, StatsMap, SCALE_UP_DEBOUNCE};
