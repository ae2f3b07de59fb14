//! Response payloads carried in the envelope `data` field.
//!
//! The dispatcher hands `data` to `serde_json::from_value` with one of these
//! as the target type; which one applies is decided by the endpoint.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One row, tagged with the table it belongs to.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Record {
    #[serde(default)]
    pub table_name: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Record {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            data: Map::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// String accessor for the common case of text columns.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

/// Result of an ORM-style select (`/db/api/query`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub records: Vec<Record>,
}

/// Result of one statement in a raw SQL select (`/db/api/querysql`).
///
/// The endpoint is multi-statement, so its payload is `Vec<SqlQueryResult>`
/// with one entry per statement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SqlQueryResult {
    #[serde(default)]
    pub records: Vec<Record>,
}

/// Outcome of one executed statement (`/db/api/sql`, `/db/api/insert`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecResult {
    #[serde(default)]
    pub rows_affected: u64,
    #[serde(default)]
    pub last_insert_id: Option<i64>,
    /// Per-statement error text; `None` on success.
    #[serde(default)]
    pub error: Option<String>,
}

/// Result of an execute call: one [`ExecResult`] per statement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecResponse {
    #[serde(default)]
    pub results: Vec<ExecResult>,
}

/// One schema object as returned by `GET /db/api/getschema`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaEntry {
    #[serde(default)]
    pub name: String,
    /// Object kind: "table", "index", "view".
    #[serde(default, rename = "type")]
    pub kind: String,
    /// The DDL that created the object, when the server exposes it.
    #[serde(default)]
    pub sql: Option<String>,
}
