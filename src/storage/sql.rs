// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL-backed grievance store.
//!
//! Statements are built per call from the [`TableLayout`], writing only the
//! mapped columns present in the row. All identifiers are quoted for the
//! dialect; all values are bound parameters.
//!
//! # Dialects
//!
//! | | MySQL (production) | SQLite (local/test) |
//! |---|---|---|
//! | quoting | `` `col` `` | `"col"` |
//! | upsert | `ON DUPLICATE KEY UPDATE c = VALUES(c)` | `ON CONFLICT(id) DO UPDATE SET c = excluded.c` |
//! | datetime read | `CAST(c AS CHAR)` | stored as text |

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use super::traits::{GrmStore, TableLayout};
use crate::database::{DbError, QueryExecutor};
use crate::mapping::Record;

pub struct SqlGrmStore {
    executor: Arc<QueryExecutor>,
    layout: TableLayout,
}

impl SqlGrmStore {
    pub fn new(executor: Arc<QueryExecutor>, layout: TableLayout) -> Self {
        Self { executor, layout }
    }

    pub fn executor(&self) -> &Arc<QueryExecutor> {
        &self.executor
    }

    pub fn layout(&self) -> &TableLayout {
        &self.layout
    }

    fn is_sqlite(&self) -> bool {
        self.executor.is_sqlite()
    }

    fn quote(&self, ident: &str) -> String {
        if self.is_sqlite() {
            format!("\"{}\"", ident.replace('"', "\"\""))
        } else {
            format!("`{}`", ident.replace('`', "``"))
        }
    }

    /// Create the grievance table if it does not exist.
    ///
    /// For local development and tests; production tables are owned by the
    /// GRM and never created implicitly.
    pub async fn ensure_schema(&self) -> Result<(), DbError> {
        if self.is_sqlite() {
            // WAL lets readers proceed during writes
            self.executor.update("PRAGMA journal_mode = WAL", &[]).await?;
        }

        let mut defs = Vec::with_capacity(self.layout.columns.len() + 1);
        for column in &self.layout.columns {
            let ty = if *column == self.layout.id_column {
                if self.is_sqlite() { "TEXT PRIMARY KEY NOT NULL" } else { "VARCHAR(64) PRIMARY KEY NOT NULL" }
            } else if Some(column) == self.layout.created_column.as_ref() {
                if self.is_sqlite() { "TEXT" } else { "DATETIME NULL" }
            } else if *column == self.layout.status_column {
                if self.is_sqlite() { "TEXT" } else { "VARCHAR(32) NULL" }
            } else {
                "TEXT"
            };
            defs.push(format!("{} {}", self.quote(column), ty));
        }
        if !self.layout.is_mapped(&self.layout.notes_column) {
            defs.push(format!("{} TEXT", self.quote(&self.layout.notes_column)));
        }

        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.quote(&self.layout.table),
            defs.join(", ")
        );
        self.executor.update(&sql, &[]).await?;
        info!(table = %self.layout.table, "Grievance table ready");
        Ok(())
    }

    fn upsert_sql(&self, columns: &[&str]) -> String {
        let table = self.quote(&self.layout.table);
        let column_list = columns
            .iter()
            .map(|c| self.quote(c))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; columns.len()].join(", ");
        let updatable: Vec<&str> = columns
            .iter()
            .copied()
            .filter(|c| *c != self.layout.id_column)
            .collect();

        let id = self.quote(&self.layout.id_column);
        if self.is_sqlite() {
            let tail = if updatable.is_empty() {
                "DO NOTHING".to_string()
            } else {
                let sets = updatable
                    .iter()
                    .map(|c| {
                        let q = self.quote(c);
                        format!("{q} = excluded.{q}")
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("DO UPDATE SET {sets}")
            };
            format!("INSERT INTO {table} ({column_list}) VALUES ({placeholders}) ON CONFLICT({id}) {tail}")
        } else {
            let sets = if updatable.is_empty() {
                format!("{id} = {id}")
            } else {
                updatable
                    .iter()
                    .map(|c| {
                        let q = self.quote(c);
                        format!("{q} = VALUES({q})")
                    })
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            format!("INSERT INTO {table} ({column_list}) VALUES ({placeholders}) ON DUPLICATE KEY UPDATE {sets}")
        }
    }

    fn select_list(&self) -> String {
        let mut columns: Vec<String> = self
            .layout
            .columns
            .iter()
            .map(|c| {
                let q = self.quote(c);
                // Any driver cannot decode DATETIME
                if !self.is_sqlite() && Some(c) == self.layout.created_column.as_ref() {
                    format!("CAST({q} AS CHAR) AS {q}")
                } else {
                    q
                }
            })
            .collect();
        if !self.layout.is_mapped(&self.layout.notes_column) {
            columns.push(self.quote(&self.layout.notes_column));
        }
        columns.join(", ")
    }
}

#[async_trait]
impl GrmStore for SqlGrmStore {
    async fn upsert(&self, row: &Record) -> Result<u64, DbError> {
        let id_column = self.layout.id_column.as_str();
        if row.get(id_column).map_or(true, Value::is_null) {
            return Err(DbError::Query(format!("row has no {} value", id_column)));
        }

        // id first, then the remaining mapped columns in layout order
        let columns: Vec<&str> = self
            .layout
            .columns
            .iter()
            .map(String::as_str)
            .filter(|c| row.contains_key(*c))
            .collect();
        let params: Vec<Value> = columns.iter().map(|c| row[*c].clone()).collect();

        let sql = self.upsert_sql(&columns);
        let outcome = self.executor.insert(&sql, &params).await?;
        debug!(
            table = %self.layout.table,
            columns = columns.len(),
            rows_affected = outcome.rows_affected,
            "Upserted grievance"
        );
        Ok(outcome.rows_affected)
    }

    async fn fetch(&self, id: &str) -> Result<Option<Record>, DbError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ? LIMIT 1",
            self.select_list(),
            self.quote(&self.layout.table),
            self.quote(&self.layout.id_column)
        );
        self.executor
            .query_one(&sql, &[Value::String(id.to_string())])
            .await
    }

    async fn update_status(
        &self,
        id: &str,
        remote_status: &str,
        notes: Option<&str>,
    ) -> Result<u64, DbError> {
        let table = self.quote(&self.layout.table);
        let status = self.quote(&self.layout.status_column);
        let id_col = self.quote(&self.layout.id_column);

        let (sql, params) = match notes {
            Some(notes) => (
                format!(
                    "UPDATE {table} SET {status} = ?, {} = ? WHERE {id_col} = ?",
                    self.quote(&self.layout.notes_column)
                ),
                vec![
                    Value::String(remote_status.to_string()),
                    Value::String(notes.to_string()),
                    Value::String(id.to_string()),
                ],
            ),
            None => (
                format!("UPDATE {table} SET {status} = ? WHERE {id_col} = ?"),
                vec![
                    Value::String(remote_status.to_string()),
                    Value::String(id.to_string()),
                ],
            ),
        };
        self.executor.update(&sql, &params).await
    }

    async fn ping(&self) -> bool {
        self.executor.test_connection().await
    }

    async fn close(&self) {
        self.executor.pool().close().await;
    }
}
