//! ORM-style convenience surface over the dispatcher.
//!
//! Selects route through the read pool, executes and inserts through the
//! write pool; every call enables auto-refresh and leader fallback. An
//! empty result set from a select is the distinct `NoRows` sentinel, not an
//! empty collection, so callers can tell "nothing matched" from "broken
//! response".

use crate::client::Client;
use quorumdb_common::protocol::error::{ClientError, Result};
use quorumdb_common::protocol::{
    Condition, ExecResult, ExecResponse, InsertRequest, ParamSql, QueryRequest, QueryResponse,
    Record, SqlQueryResult, SqlRequest,
};
use quorumdb_common::Intent;
use reqwest::Method;

const QUERY_ENDPOINT: &str = "/db/api/query";
const QUERY_SQL_ENDPOINT: &str = "/db/api/querysql";
const EXEC_ENDPOINT: &str = "/db/api/sql";
const INSERT_ENDPOINT: &str = "/db/api/insert";

impl Client {
    async fn run_query(&self, request: QueryRequest) -> Result<QueryResponse> {
        let body = serde_json::to_value(&request)?;
        self.inner()
            .request(
                Method::POST,
                QUERY_ENDPOINT,
                Some(body),
                Intent::Read,
                true,
                true,
            )
            .await
    }

    async fn run_query_sql(&self, request: SqlRequest) -> Result<Vec<SqlQueryResult>> {
        let body = serde_json::to_value(&request)?;
        self.inner()
            .request(
                Method::POST,
                QUERY_SQL_ENDPOINT,
                Some(body),
                Intent::Read,
                true,
                true,
            )
            .await
    }

    async fn run_exec(&self, endpoint: &str, body: serde_json::Value) -> Result<ExecResponse> {
        self.inner()
            .request(Method::POST, endpoint, Some(body), Intent::Write, true, true)
            .await
    }

    /// Selects a single record from a table.
    pub async fn select_one(&self, table: &str) -> Result<Record> {
        let response = self.run_query(QueryRequest::table(table).single_row(true)).await?;
        response.records.into_iter().next().ok_or(ClientError::NoRows)
    }

    /// Selects all records from a table.
    pub async fn select_many(&self, table: &str) -> Result<Vec<Record>> {
        let response = self.run_query(QueryRequest::table(table)).await?;
        if response.records.is_empty() {
            return Err(ClientError::NoRows);
        }
        Ok(response.records)
    }

    /// Selects a single record matching a condition.
    pub async fn select_one_with_condition(
        &self,
        table: &str,
        condition: Condition,
    ) -> Result<Record> {
        let request = QueryRequest::table(table)
            .with_condition(condition)
            .single_row(true);
        let response = self.run_query(request).await?;
        response.records.into_iter().next().ok_or(ClientError::NoRows)
    }

    /// Selects all records matching a condition.
    pub async fn select_many_with_condition(
        &self,
        table: &str,
        condition: Condition,
    ) -> Result<Vec<Record>> {
        let request = QueryRequest::table(table).with_condition(condition);
        let response = self.run_query(request).await?;
        if response.records.is_empty() {
            return Err(ClientError::NoRows);
        }
        Ok(response.records)
    }

    /// Runs one SQL select, returning its rows.
    pub async fn select_sql(&self, sql: &str) -> Result<Vec<Record>> {
        let response = self.run_query_sql(SqlRequest::statements([sql])).await?;
        let records = response.into_iter().next().map(|r| r.records).unwrap_or_default();
        if records.is_empty() {
            return Err(ClientError::NoRows);
        }
        Ok(records)
    }

    /// Runs several SQL selects, returning one row set per statement.
    pub async fn select_many_sql<I, S>(&self, statements: I) -> Result<Vec<Vec<Record>>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let response = self.run_query_sql(SqlRequest::statements(statements)).await?;
        if response.is_empty() {
            return Err(ClientError::NoRows);
        }
        Ok(response.into_iter().map(|r| r.records).collect())
    }

    /// Runs a SQL select that must yield exactly one row.
    pub async fn select_only_one_sql(&self, sql: &str) -> Result<Record> {
        let request = SqlRequest::statements([sql]).single_row(true);
        let response = self.run_query_sql(request).await?;
        let mut records = response.into_iter().next().map(|r| r.records).unwrap_or_default();
        match records.len() {
            0 => Err(ClientError::NoRows),
            1 => Ok(records.remove(0)),
            _ => Err(ClientError::MoreThanOneRow),
        }
    }

    /// Runs one parameterised SQL select.
    pub async fn select_sql_parameterized(&self, param: ParamSql) -> Result<Vec<Record>> {
        let response = self.run_query_sql(SqlRequest::parameterized([param])).await?;
        let records = response.into_iter().next().map(|r| r.records).unwrap_or_default();
        if records.is_empty() {
            return Err(ClientError::NoRows);
        }
        Ok(records)
    }

    /// Runs several parameterised SQL selects.
    pub async fn select_many_sql_parameterized<I>(&self, params: I) -> Result<Vec<Vec<Record>>>
    where
        I: IntoIterator<Item = ParamSql>,
    {
        let response = self
            .run_query_sql(SqlRequest::parameterized(params))
            .await?;
        if response.is_empty() {
            return Err(ClientError::NoRows);
        }
        Ok(response.into_iter().map(|r| r.records).collect())
    }

    /// Runs a parameterised SQL select that must yield exactly one row.
    pub async fn select_only_one_sql_parameterized(&self, param: ParamSql) -> Result<Record> {
        let request = SqlRequest::parameterized([param]).single_row(true);
        let response = self.run_query_sql(request).await?;
        let mut records = response.into_iter().next().map(|r| r.records).unwrap_or_default();
        match records.len() {
            0 => Err(ClientError::NoRows),
            1 => Ok(records.remove(0)),
            _ => Err(ClientError::MoreThanOneRow),
        }
    }

    /// Executes one SQL statement.
    pub async fn exec_sql(&self, sql: &str) -> Result<ExecResult> {
        let body = serde_json::to_value(SqlRequest::statements([sql]))?;
        let response = self.run_exec(EXEC_ENDPOINT, body).await?;
        response
            .results
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::MalformedResponse("no results returned".to_string()))
    }

    /// Executes several SQL statements, one result per statement.
    pub async fn exec_many_sql<I, S>(&self, statements: I) -> Result<Vec<ExecResult>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let body = serde_json::to_value(SqlRequest::statements(statements))?;
        let response = self.run_exec(EXEC_ENDPOINT, body).await?;
        if response.results.is_empty() {
            return Err(ClientError::MalformedResponse(
                "no results returned".to_string(),
            ));
        }
        Ok(response.results)
    }

    /// Executes one parameterised SQL statement.
    pub async fn exec_sql_parameterized(&self, param: ParamSql) -> Result<ExecResult> {
        let body = serde_json::to_value(SqlRequest::parameterized([param]))?;
        let response = self.run_exec(EXEC_ENDPOINT, body).await?;
        response
            .results
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::MalformedResponse("no results returned".to_string()))
    }

    /// Executes several parameterised SQL statements.
    pub async fn exec_many_sql_parameterized<I>(&self, params: I) -> Result<Vec<ExecResult>>
    where
        I: IntoIterator<Item = ParamSql>,
    {
        let body = serde_json::to_value(SqlRequest::parameterized(params))?;
        let response = self.run_exec(EXEC_ENDPOINT, body).await?;
        if response.results.is_empty() {
            return Err(ClientError::MalformedResponse(
                "no results returned".to_string(),
            ));
        }
        Ok(response.results)
    }

    /// Inserts one record.
    pub async fn insert_one(&self, record: Record, queue: bool) -> Result<ExecResult> {
        let request = InsertRequest::new(vec![record]).queued(queue).same_table(true);
        let body = serde_json::to_value(request)?;
        let response = self.run_exec(INSERT_ENDPOINT, body).await?;
        response
            .results
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::MalformedResponse("no results returned".to_string()))
    }

    /// Inserts a batch of records, possibly spanning tables.
    pub async fn insert_many(&self, records: Vec<Record>, queue: bool) -> Result<Vec<ExecResult>> {
        let request = InsertRequest::new(records).queued(queue);
        let body = serde_json::to_value(request)?;
        let response = self.run_exec(INSERT_ENDPOINT, body).await?;
        if response.results.is_empty() {
            return Err(ClientError::MalformedResponse(
                "no results returned".to_string(),
            ));
        }
        Ok(response.results)
    }

    /// Inserts a batch of records that all target the same table.
    pub async fn insert_many_same_table(
        &self,
        records: Vec<Record>,
        queue: bool,
    ) -> Result<Vec<ExecResult>> {
        let request = InsertRequest::new(records).queued(queue).same_table(true);
        let body = serde_json::to_value(request)?;
        let response = self.run_exec(INSERT_ENDPOINT, body).await?;
        if response.results.is_empty() {
            return Err(ClientError::MalformedResponse(
                "no results returned".to_string(),
            ));
        }
        Ok(response.results)
    }
}
