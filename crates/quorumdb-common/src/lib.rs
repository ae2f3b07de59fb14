//! QuorumDB Common Types and Configuration
//!
//! This crate provides the shared protocol definitions, error types and
//! configuration layer for the QuorumDB client.
//!
//! # Overview
//!
//! QuorumDB is a clustered SQL-over-HTTP database with one leader node
//! (read/write) and zero or more peers (typically read-only). Applications
//! talk to the cluster through the client crate; this crate contains the
//! pieces every component agrees on:
//!
//! - **Protocol layer**: the standard `{status, message, data}` response
//!   envelope, token pairs, cluster status, and the query/SQL/insert request
//!   and response payloads
//! - **Error layer**: the [`ClientError`] enum and `Result` alias
//! - **Configuration layer**: client, pool and HTTP-transport settings,
//!   loadable from the environment and overridable with builder methods
//!
//! # Wire format
//!
//! Every server response is a JSON envelope:
//!
//! ```json
//! {"status": 200, "message": "", "data": { ... }}
//! ```
//!
//! A non-200 `status` field signals an application-level error regardless of
//! the HTTP status code; `data` semantics are endpoint-specific.
//!
//! # Example
//!
//! ```
//! use quorumdb_common::config::ClientConfig;
//! use quorumdb_common::protocol::QueryRequest;
//!
//! let config = ClientConfig::default()
//!     .with_server_url("http://127.0.0.1:8080")
//!     .with_username("admin")
//!     .with_password("admin");
//!
//! let request = QueryRequest::table("users").single_row(true);
//! assert_eq!(request.table, "users");
//! # let _ = config;
//! ```

pub mod config;
pub mod intent;
pub mod protocol;

pub use config::{ClientConfig, HttpConfig, PoolConfig};
pub use intent::Intent;
pub use protocol::error::{ClientError, Result};
pub use protocol::*;
