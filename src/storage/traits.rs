// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;

use crate::config::IntegrationConfig;
use crate::database::DbError;
use crate::mapping::{FieldMapper, Record};

/// Where grievances live on the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    pub table: String,
    pub id_column: String,
    pub status_column: String,
    pub notes_column: String,
    /// Stored as DATETIME remotely
    pub created_column: Option<String>,
    /// Every mapped column, id first
    pub columns: Vec<String>,
}

impl TableLayout {
    pub fn from_mapper(mapper: &FieldMapper, config: &IntegrationConfig) -> Self {
        let id_column = mapper.id_column().to_string();
        let mut columns = vec![id_column.clone()];
        columns.extend(
            mapper
                .fields()
                .remote_columns()
                .filter(|c| *c != id_column)
                .map(String::from),
        );
        Self {
            table: config.remote_table.clone(),
            id_column,
            status_column: mapper.status_column().to_string(),
            notes_column: config.notes_column.clone(),
            created_column: mapper.created_column().map(String::from),
            columns,
        }
    }

    /// Whether `column` may be written by an upsert.
    pub fn is_mapped(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

/// Remote grievance table operations.
///
/// Implementations return [`DbError`] so callers can tell connection-class
/// failures (retryable) from query failures.
#[async_trait]
pub trait GrmStore: Send + Sync {
    /// Insert or update the row keyed by its id column. Returns the driver's
    /// affected-row count (MySQL reports 2 for an update, 0 for no change).
    ///
    /// Every column present in `row` overwrites the stored value, including
    /// the creation date, so re-syncs should carry the original `created_at`.
    async fn upsert(&self, row: &Record) -> Result<u64, DbError>;

    /// Remote row by identifier, `None` when absent.
    async fn fetch(&self, id: &str) -> Result<Option<Record>, DbError>;

    /// Set the remote status (and notes, when given). Returns rows affected.
    async fn update_status(
        &self,
        id: &str,
        remote_status: &str,
        notes: Option<&str>,
    ) -> Result<u64, DbError>;

    /// Cheap health check. Never errors.
    async fn ping(&self) -> bool;

    /// Release backend resources. Default: nothing to release.
    async fn close(&self) {}
}
