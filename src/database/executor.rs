// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Parameterized statement execution.
//!
//! Every statement leases a connection for exactly its own duration, runs
//! under the configured query timeout, and is logged with its elapsed time.
//! Parameter values are never logged.
//!
//! # sqlx Any driver quirks
//!
//! - MySQL `TEXT` columns arrive as bytes, so decoding falls back from
//!   `String` to `Vec<u8>` and re-reads as UTF-8.
//! - The Any driver has no date/time types. Callers reading `DATETIME`
//!   columns must `CAST` them to text in the select list.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use sqlx::any::{AnyArguments, AnyRow};
use sqlx::AnyConnection;
use sqlx::query::Query;
use sqlx::{Any, Column, Connection, Row};
use tracing::{debug, info, warn};

use super::error::DbError;
use super::pool::{ConnFuture, ConnectionPool};
use crate::metrics::{self, LatencyTimer};

/// A result row keyed by column name.
pub type DbRow = serde_json::Map<String, Value>;

/// Outcome of an INSERT/UPDATE/DELETE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteOutcome {
    pub rows_affected: u64,
    /// Generated key, when the driver reports one
    pub last_insert_id: Option<i64>,
}

/// One column of a remote table, as reported by the server catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    /// `PRI`, `UNI`, `MUL` or empty
    pub key: String,
    pub default: Option<String>,
}

impl ColumnInfo {
    pub fn is_primary_key(&self) -> bool {
        self.key == "PRI"
    }
}

pub struct QueryExecutor {
    pool: Arc<ConnectionPool>,
    query_timeout: Duration,
}

impl QueryExecutor {
    pub fn new(pool: Arc<ConnectionPool>, query_timeout: Duration) -> Self {
        Self { pool, query_timeout }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn is_sqlite(&self) -> bool {
        self.pool.is_sqlite()
    }

    /// Run a SELECT and return every row.
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<DbRow>, DbError> {
        let timer = LatencyTimer::new("query");
        let mut lease = self.pool.acquire().await?;
        let result = self
            .bounded("query", fetch_rows(&mut lease, sql, params))
            .await;
        let rows = result.as_ref().map_or(0, |r| r.len() as u64);
        log_outcome("query", sql, params.len(), timer.elapsed(), rows, &result);
        result
    }

    /// Run a SELECT expected to return at most one row.
    pub async fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<DbRow>, DbError> {
        Ok(self.query(sql, params).await?.into_iter().next())
    }

    /// Run an UPDATE/DELETE and return the affected row count.
    pub async fn update(&self, sql: &str, params: &[Value]) -> Result<u64, DbError> {
        let timer = LatencyTimer::new("update");
        let mut lease = self.pool.acquire().await?;
        let result = self.bounded("update", execute(&mut lease, sql, params)).await;
        let rows = result.as_ref().map_or(0, |o| o.rows_affected);
        log_outcome("update", sql, params.len(), timer.elapsed(), rows, &result);
        result.map(|o| o.rows_affected)
    }

    /// Run an INSERT (or upsert).
    pub async fn insert(&self, sql: &str, params: &[Value]) -> Result<WriteOutcome, DbError> {
        let timer = LatencyTimer::new("insert");
        let mut lease = self.pool.acquire().await?;
        let result = self.bounded("insert", execute(&mut lease, sql, params)).await;
        let rows = result.as_ref().map_or(0, |o| o.rows_affected);
        log_outcome("insert", sql, params.len(), timer.elapsed(), rows, &result);
        result
    }

    /// Health check: `SELECT 1` round trip. Never errors.
    pub async fn test_connection(&self) -> bool {
        match self.query("SELECT 1 AS ok", &[]).await {
            Ok(rows) => {
                let healthy = !rows.is_empty();
                metrics::set_backend_healthy("database", healthy);
                healthy
            }
            Err(e) => {
                warn!(error = %e, "Database health check failed");
                metrics::set_backend_healthy("database", false);
                false
            }
        }
    }

    /// Run `work` inside one transaction on one leased connection.
    ///
    /// Commits when `work` returns `Ok`. On `Err` the transaction is rolled
    /// back and the error is returned wrapped as a rolled-back query error,
    /// keeping its retryability. Statements inside `work` go through
    /// [`fetch_rows`] and [`execute`] on the connection it is given.
    pub async fn with_transaction<T, F>(&self, work: F) -> Result<T, DbError>
    where
        T: Send + 'static,
        F: for<'c> FnOnce(&'c mut AnyConnection) -> ConnFuture<'c, T> + Send,
    {
        let timer = LatencyTimer::new("transaction");
        let mut lease = self.pool.acquire().await?;
        let mut tx = lease.begin().await.map_err(DbError::from)?;

        let outcome = self.bounded("transaction", work(&mut *tx)).await;
        match outcome {
            Ok(value) => {
                tx.commit().await.map_err(DbError::from)?;
                metrics::record_operation("transaction", "success");
                debug!(elapsed_ms = timer.elapsed().as_millis() as u64, "Transaction committed");
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Transaction rollback failed");
                }
                metrics::record_operation("transaction", "error");
                metrics::record_error("transaction", e.kind());
                warn!(
                    error = %e,
                    elapsed_ms = timer.elapsed().as_millis() as u64,
                    "Transaction rolled back"
                );
                Err(match e {
                    DbError::Query(msg) => DbError::Query(format!("transaction rolled back: {msg}")),
                    DbError::Connection(msg) => {
                        DbError::Connection(format!("transaction rolled back: {msg}"))
                    }
                    other => other,
                })
            }
        }
    }

    /// Names of the tables in the connected database.
    pub async fn list_tables(&self) -> Result<Vec<String>, DbError> {
        let sql = if self.is_sqlite() {
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name"
        } else {
            "SELECT TABLE_NAME AS name FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = DATABASE() ORDER BY TABLE_NAME"
        };
        let rows = self.query(sql, &[]).await?;
        Ok(rows
            .iter()
            .filter_map(|r| text(r, "name"))
            .collect())
    }

    /// Column layout of `table`. Empty when the table does not exist.
    pub async fn describe_table(&self, table: &str) -> Result<Vec<ColumnInfo>, DbError> {
        let param = [Value::String(table.to_string())];
        if self.is_sqlite() {
            let rows = self
                .query(
                    "SELECT name, type AS data_type, \"notnull\" AS not_null, pk, dflt_value AS default_value \
                     FROM pragma_table_info(?)",
                    &param,
                )
                .await?;
            return Ok(rows
                .iter()
                .map(|r| ColumnInfo {
                    name: text(r, "name").unwrap_or_default(),
                    data_type: text(r, "data_type").unwrap_or_default(),
                    nullable: r.get("not_null").and_then(Value::as_i64) == Some(0),
                    key: if r.get("pk").and_then(Value::as_i64).unwrap_or(0) > 0 {
                        "PRI".to_string()
                    } else {
                        String::new()
                    },
                    default: text(r, "default_value"),
                })
                .collect());
        }

        let rows = self
            .query(
                "SELECT COLUMN_NAME AS name, COLUMN_TYPE AS data_type, IS_NULLABLE AS nullable, \
                 COLUMN_KEY AS col_key, COLUMN_DEFAULT AS default_value \
                 FROM information_schema.COLUMNS \
                 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? ORDER BY ORDINAL_POSITION",
                &param,
            )
            .await?;
        Ok(rows
            .iter()
            .map(|r| ColumnInfo {
                name: text(r, "name").unwrap_or_default(),
                data_type: text(r, "data_type").unwrap_or_default(),
                nullable: text(r, "nullable").as_deref() == Some("YES"),
                key: text(r, "col_key").unwrap_or_default(),
                default: text(r, "default_value"),
            })
            .collect())
    }

    /// Server version string, if the server reports one.
    pub async fn server_version(&self) -> Result<Option<String>, DbError> {
        let sql = if self.is_sqlite() {
            "SELECT sqlite_version() AS version"
        } else {
            "SELECT VERSION() AS version"
        };
        Ok(self
            .query_one(sql, &[])
            .await?
            .and_then(|r| text(&r, "version")))
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T, DbError>>,
    ) -> Result<T, DbError> {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(DbError::Timeout {
                operation,
                after: self.query_timeout,
            }),
        }
    }
}

/// Run a SELECT on a specific connection (e.g. inside a transaction).
pub async fn fetch_rows(
    conn: &mut AnyConnection,
    sql: &str,
    params: &[Value],
) -> Result<Vec<DbRow>, DbError> {
    let rows = bind_all(sqlx::query(sql), params)
        .fetch_all(&mut *conn)
        .await
        .map_err(DbError::from)?;
    Ok(rows.iter().map(row_to_map).collect())
}

/// Run a write statement on a specific connection.
pub async fn execute(
    conn: &mut AnyConnection,
    sql: &str,
    params: &[Value],
) -> Result<WriteOutcome, DbError> {
    let result = bind_all(sqlx::query(sql), params)
        .execute(&mut *conn)
        .await
        .map_err(DbError::from)?;
    Ok(WriteOutcome {
        rows_affected: result.rows_affected(),
        last_insert_id: result.last_insert_id(),
    })
}

fn bind_all<'q>(
    mut query: Query<'q, Any, AnyArguments<'q>>,
    params: &'q [Value],
) -> Query<'q, Any, AnyArguments<'q>> {
    for param in params {
        query = match param {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => query.bind(i),
                (None, Some(f)) => query.bind(f),
                (None, None) => query.bind(n.to_string()),
            },
            Value::String(s) => query.bind(s.as_str()),
            // Nested values are stored as JSON text
            nested => query.bind(nested.to_string()),
        };
    }
    query
}

fn row_to_map(row: &AnyRow) -> DbRow {
    let mut map = DbRow::new();
    for (idx, column) in row.columns().iter().enumerate() {
        map.insert(column.name().to_string(), decode_column(row, idx));
    }
    map
}

fn decode_column(row: &AnyRow, idx: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map_or(Value::Null, Value::from);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.map_or(Value::Null, Value::from);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map_or(Value::Null, Value::String);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return v.map_or(Value::Null, Value::Bool);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return v.map_or(Value::Null, |bytes| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        });
    }
    Value::Null
}

fn text(row: &DbRow, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// First line of a statement, trimmed, for log fields.
fn statement_summary(sql: &str) -> &str {
    let first = sql.trim_start().lines().next().unwrap_or_default();
    match first.char_indices().nth(80) {
        Some((cut, _)) => &first[..cut],
        None => first,
    }
}

fn log_outcome<T>(
    operation: &'static str,
    sql: &str,
    param_count: usize,
    elapsed: Duration,
    rows: u64,
    result: &Result<T, DbError>,
) {
    let elapsed_ms = elapsed.as_millis() as u64;
    match result {
        Ok(_) => {
            metrics::record_operation(operation, "success");
            metrics::record_rows(operation, rows);
            if elapsed > SLOW_STATEMENT {
                info!(operation, sql = statement_summary(sql), elapsed_ms, rows, "Slow statement");
            } else {
                debug!(operation, sql = statement_summary(sql), param_count, elapsed_ms, rows, "Statement complete");
            }
        }
        Err(e) => {
            metrics::record_operation(operation, "error");
            metrics::record_error(operation, e.kind());
            warn!(operation, sql = statement_summary(sql), elapsed_ms, error = %e, "Statement failed");
        }
    }
}

const SLOW_STATEMENT: Duration = Duration::from_secs(1);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;
    use serde_json::json;
    use tempfile::TempDir;

    async fn executor(dir: &TempDir) -> QueryExecutor {
        let config = ConnectionConfig {
            url: Some(format!(
                "sqlite://{}?mode=rwc",
                dir.path().join("exec.db").display()
            )),
            pool_size: 2,
            ..Default::default()
        };
        let pool = ConnectionPool::connect(&config, "", 0).await.unwrap();
        let exec = QueryExecutor::new(Arc::new(pool), Duration::from_secs(5));
        exec.update(
            "CREATE TABLE cases (id TEXT PRIMARY KEY NOT NULL, amount REAL, visits INTEGER, note TEXT DEFAULT 'none')",
            &[],
        )
        .await
        .unwrap();
        exec
    }

    #[tokio::test]
    async fn test_insert_query_update() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir).await;

        let outcome = exec
            .insert(
                "INSERT INTO cases (id, amount, visits, note) VALUES (?, ?, ?, ?)",
                &[json!("GR-1"), json!(12.5), json!(3), Value::Null],
            )
            .await
            .unwrap();
        assert_eq!(outcome.rows_affected, 1);

        let rows = exec
            .query("SELECT id, amount, visits, note FROM cases WHERE id = ?", &[json!("GR-1")])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], json!("GR-1"));
        assert_eq!(rows[0]["amount"], json!(12.5));
        assert_eq!(rows[0]["visits"], json!(3));
        assert_eq!(rows[0]["note"], Value::Null);

        let affected = exec
            .update("UPDATE cases SET visits = visits + 1 WHERE id = ?", &[json!("GR-1")])
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let missing = exec
            .update("UPDATE cases SET visits = 0 WHERE id = ?", &[json!("nope")])
            .await
            .unwrap();
        assert_eq!(missing, 0);
    }

    #[tokio::test]
    async fn test_query_one_on_empty_result() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir).await;
        let row = exec
            .query_one("SELECT id FROM cases WHERE id = ?", &[json!("absent")])
            .await
            .unwrap();
        assert!(row.is_none());
    }

    #[tokio::test]
    async fn test_bad_sql_is_query_error() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir).await;
        let err = exec.query("SELEKT nonsense", &[]).await.unwrap_err();
        assert!(matches!(err, DbError::Query(_)));
        assert!(!err.is_retryable());

        // The failed statement released its lease
        assert!(exec.test_connection().await);
    }

    #[tokio::test]
    async fn test_transaction_commits() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir).await;

        let inserted = exec
            .with_transaction(|conn| {
                Box::pin(async move {
                    let a = execute(conn, "INSERT INTO cases (id) VALUES (?)", &[json!("A")]).await?;
                    let b = execute(conn, "INSERT INTO cases (id) VALUES (?)", &[json!("B")]).await?;
                    Ok(a.rows_affected + b.rows_affected)
                })
            })
            .await
            .unwrap();
        assert_eq!(inserted, 2);

        let rows = exec.query("SELECT id FROM cases ORDER BY id", &[]).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_on_error() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir).await;

        let result: Result<(), DbError> = exec
            .with_transaction(|conn| {
                Box::pin(async move {
                    execute(conn, "INSERT INTO cases (id) VALUES (?)", &[json!("A")]).await?;
                    // Duplicate key fails the second statement
                    execute(conn, "INSERT INTO cases (id) VALUES (?)", &[json!("A")]).await?;
                    Ok(())
                })
            })
            .await;

        match result {
            Err(DbError::Query(msg)) => assert!(msg.contains("rolled back")),
            other => panic!("expected rolled-back query error, got {:?}", other),
        }
        let rows = exec.query("SELECT id FROM cases", &[]).await.unwrap();
        assert!(rows.is_empty(), "first insert must not survive the rollback");
    }

    #[tokio::test]
    async fn test_introspection() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir).await;

        assert_eq!(exec.list_tables().await.unwrap(), vec!["cases".to_string()]);

        let columns = exec.describe_table("cases").await.unwrap();
        let names: Vec<_> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["id", "amount", "visits", "note"]);
        assert!(columns[0].is_primary_key());
        assert!(!columns[0].nullable);
        assert!(columns[1].nullable);
        assert_eq!(columns[3].default.as_deref(), Some("'none'"));

        assert!(exec.describe_table("no_such_table").await.unwrap().is_empty());

        let version = exec.server_version().await.unwrap();
        assert!(version.is_some_and(|v| v.starts_with('3')));
    }

    #[test]
    fn test_statement_summary_truncates() {
        let long = format!("SELECT {} FROM t", "x, ".repeat(60));
        assert_eq!(statement_summary(&long).chars().count(), 80);
        assert_eq!(statement_summary("\n  UPDATE t\nSET a = 1"), "UPDATE t");
    }
}
