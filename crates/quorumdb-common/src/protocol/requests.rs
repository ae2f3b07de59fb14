//! Request payloads for the QuorumDB API endpoints.
//!
//! Four POST endpoints accept structured bodies:
//!
//! - `/db/connect`: [`ConnectRequest`] (credentials, no token)
//! - `/db/refresh`: [`RefreshRequest`] (refresh token, no access token)
//! - `/db/api/query`: [`QueryRequest`] (table + optional condition)
//! - `/db/api/querysql`, `/db/api/sql`: [`SqlRequest`] (raw or parameterised)
//! - `/db/api/insert`: [`InsertRequest`] (record batches)

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::responses::Record;

/// Credentials body for `/db/connect`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub username: String,
    pub password: String,
}

impl ConnectRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Body for `/db/refresh`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

impl RefreshRequest {
    pub fn new(refresh_token: impl Into<String>) -> Self {
        Self {
            refresh_token: refresh_token.into(),
        }
    }
}

/// A filter applied to an ORM-style query.
///
/// Conditions compare one field against a value and can be chained with
/// `and`/`or` groups:
///
/// ```
/// use quorumdb_common::protocol::Condition;
/// use serde_json::json;
///
/// let cond = Condition::eq("status", json!("active"))
///     .and(Condition::new("age", ">=", json!(18)));
/// assert_eq!(cond.and.len(), 1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub and: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub or: Vec<Condition>,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value,
            and: Vec::new(),
            or: Vec::new(),
        }
    }

    /// Equality shorthand, the most common comparison.
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, "=", value)
    }

    pub fn and(mut self, other: Condition) -> Self {
        self.and.push(other);
        self
    }

    pub fn or(mut self, other: Condition) -> Self {
        self.or.push(other);
        self
    }
}

/// ORM-style select for `/db/api/query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default)]
    pub single_row: bool,
}

impl QueryRequest {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            condition: None,
            single_row: false,
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn single_row(mut self, single: bool) -> Self {
        self.single_row = single;
        self
    }
}

/// One parameterised SQL statement: the query text with `?` placeholders and
/// the values bound to them, in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSql {
    pub query: String,
    #[serde(default)]
    pub values: Vec<Value>,
}

impl ParamSql {
    pub fn new(query: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            query: query.into(),
            values,
        }
    }
}

/// Raw or parameterised SQL for `/db/api/querysql` (select) and
/// `/db/api/sql` (execute). Multi-statement: each entry in `statements` or
/// `param_sql` produces one result in the response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SqlRequest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statements: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub param_sql: Vec<ParamSql>,
    #[serde(default)]
    pub single_row: bool,
}

impl SqlRequest {
    pub fn statements<I, S>(statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            statements: statements.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn parameterized<I>(params: I) -> Self
    where
        I: IntoIterator<Item = ParamSql>,
    {
        Self {
            param_sql: params.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn single_row(mut self, single: bool) -> Self {
        self.single_row = single;
        self
    }
}

/// Record batch for `/db/api/insert`.
///
/// `queue` asks the server to acknowledge before the write is durable on
/// every peer; `same_table` lets the server skip per-record table resolution
/// when the whole batch targets one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertRequest {
    pub records: Vec<Record>,
    #[serde(default)]
    pub queue: bool,
    #[serde(default)]
    pub same_table: bool,
}

impl InsertRequest {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            queue: false,
            same_table: false,
        }
    }

    pub fn queued(mut self, queue: bool) -> Self {
        self.queue = queue;
        self
    }

    pub fn same_table(mut self, same: bool) -> Self {
        self.same_table = same;
        self
    }
}
