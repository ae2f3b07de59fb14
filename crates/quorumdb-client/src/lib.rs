//! QuorumDB Client
//!
//! This crate provides the client for QuorumDB clusters: a pool of
//! authenticated HTTP sessions per node, with read/write routing, true
//! node-level round-robin, transparent token refresh, leader fallback, and
//! load-driven scaling.
//!
//! # Overview
//!
//! A QuorumDB cluster has one leader (read/write) and zero or more peers
//! (typically read-only). There is no long-lived socket per session; a
//! "session" is a token pair plus an HTTP transport, so the pool is really a
//! pool of credentials that saves the cost of re-authenticating per request.
//!
//! The client keeps two pools, one per intent:
//!
//! - **Read pool**: sessions for every node, selected with node-level
//!   round-robin so load spreads across peers before it rotates within a
//!   node's sessions
//! - **Write pool**: leader-biased, one session per node by default so
//!   writes serialise through a single transport
//!
//! # Usage
//!
//! ```rust,no_run
//! use quorumdb_client::Client;
//! use quorumdb_common::ClientConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new(ClientConfig::from_env())?;
//!     client.connect("admin", "admin").await?;
//!
//!     let users = client.select_many("users").await?;
//!     println!("{} users", users.len());
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Scaling behaviour
//!
//! Every dispatched request bumps the active-request counter for its
//! (node, intent). When the counter reaches `scale_up_threshold`, and at
//! most once per 10 s per (node, intent), a scale-up is enqueued onto a
//! bounded queue and a background worker adds `scale_up_batch` freshly
//! authenticated sessions, capped by the node's ceiling. A periodic reaper
//! removes sessions idle past `idle_timeout`, never dropping a node below
//! the batch minimum.
//!
//! # Failure handling
//!
//! A 401 triggers one token refresh (falling back to re-authentication with
//! the stored credentials) and one retry. Any other failure on a non-leader
//! session can fall back to the leader once. Everything else surfaces to the
//! caller.

pub mod client;
pub mod dispatch;
pub mod metrics;
pub mod orm;
pub mod pool;
pub mod scaler;
pub mod session;

pub use client::Client;
pub use pool::SessionPool;
pub use session::Session;
