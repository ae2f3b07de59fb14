//! QuorumDB wire protocol.
//!
//! Everything the server sends or accepts lives here: the standard response
//! [`Envelope`], authentication [`TokenPair`]s, cluster [`ClusterStatus`]
//! discovery, and the query/SQL/insert request and response payloads.

pub mod envelope;
pub mod error;
pub mod requests;
pub mod responses;
pub mod status;

pub use envelope::{Envelope, TokenPair};
pub use requests::{
    Condition, ConnectRequest, InsertRequest, ParamSql, QueryRequest, RefreshRequest, SqlRequest,
};
pub use responses::{ExecResult, ExecResponse, QueryResponse, Record, SchemaEntry, SqlQueryResult};
pub use status::{ClusterStatus, NodeDescriptor, NodeMode};
