// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::traits::{GrmStore, TableLayout};
use crate::database::DbError;
use crate::mapping::Record;

/// In-process grievance table. Upsert semantics match the SQL store: only
/// columns present in the row are written.
///
/// Counts every call so tests can assert that guarded paths did no I/O.
pub struct InMemoryGrmStore {
    layout: TableLayout,
    rows: DashMap<String, Record>,
    calls: AtomicU64,
    healthy: AtomicBool,
}

impl InMemoryGrmStore {
    #[must_use]
    pub fn new(layout: TableLayout) -> Self {
        Self {
            layout,
            rows: DashMap::new(),
            calls: AtomicU64::new(0),
            healthy: AtomicBool::new(true),
        }
    }

    /// Total store calls so far
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Flip the result of [`GrmStore::ping`].
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn get(&self, id: &str) -> Option<Record> {
        self.rows.get(id).map(|r| r.value().clone())
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl GrmStore for InMemoryGrmStore {
    async fn upsert(&self, row: &Record) -> Result<u64, DbError> {
        self.touch();
        let id = match row.get(&self.layout.id_column) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(DbError::Query(format!(
                    "row has no {} value",
                    self.layout.id_column
                )))
            }
        };

        let mut entry = self.rows.entry(id).or_default();
        for (column, value) in row {
            if self.layout.is_mapped(column) {
                entry.insert(column.clone(), value.clone());
            }
        }
        Ok(1)
    }

    async fn fetch(&self, id: &str) -> Result<Option<Record>, DbError> {
        self.touch();
        Ok(self.get(id))
    }

    async fn update_status(
        &self,
        id: &str,
        remote_status: &str,
        notes: Option<&str>,
    ) -> Result<u64, DbError> {
        self.touch();
        let Some(mut row) = self.rows.get_mut(id) else {
            return Ok(0);
        };
        row.insert(
            self.layout.status_column.clone(),
            Value::String(remote_status.to_string()),
        );
        if let Some(notes) = notes {
            row.insert(self.layout.notes_column.clone(), Value::String(notes.to_string()));
        }
        Ok(1)
    }

    async fn ping(&self) -> bool {
        self.touch();
        self.healthy.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IntegrationConfig;
    use crate::mapping::FieldMapper;
    use serde_json::json;

    fn store() -> InMemoryGrmStore {
        InMemoryGrmStore::new(TableLayout::from_mapper(
            &FieldMapper::default(),
            &IntegrationConfig::default(),
        ))
    }

    fn row(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_new_store_is_empty() {
        let store = store();
        assert!(store.is_empty());
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_upsert_merges_columns() {
        let store = store();
        store
            .upsert(&row(json!({"grievance_id": "GR-1", "grievance_details": "dust"})))
            .await
            .unwrap();
        store
            .upsert(&row(json!({"grievance_id": "GR-1", "case_status": "submitted", "extra": 1})))
            .await
            .unwrap();

        let stored = store.fetch("GR-1").await.unwrap().unwrap();
        assert_eq!(stored["grievance_details"], "dust");
        assert_eq!(stored["case_status"], "submitted");
        assert!(!stored.contains_key("extra"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.calls(), 3);
    }

    #[tokio::test]
    async fn test_upsert_requires_id() {
        let store = store();
        let err = store.upsert(&row(json!({"case_status": "pending"}))).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_update_status_on_missing_row() {
        let store = store();
        assert_eq!(store.update_status("GR-9", "resolved", None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ping_follows_health_flag() {
        let store = store();
        assert!(store.ping().await);
        store.set_healthy(false);
        assert!(!store.ping().await);
    }
}
