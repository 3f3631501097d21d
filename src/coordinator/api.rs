// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync operations: single record, batch, status lookup and update, retry
//! scheduling and statistics.

use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::{BatchReport, BatchSummary, SyncError};
use super::SyncOrchestrator;
use crate::mapping::Record;
use crate::metrics::{self, LatencyTimer};
use crate::sync_result::{SyncResult, SyncStatistics, SyncStatus};

impl SyncOrchestrator {
    /// Sync one record as a first attempt. Never fails: errors come back as a
    /// FAILED result with the cause in `error`.
    pub async fn sync_one(&self, record: &Record) -> SyncResult {
        self.sync_attempt(record, 0).await
    }

    /// Sync one record, tagging the result with the scheduler's attempt
    /// counter.
    #[tracing::instrument(skip(self, record), fields(record_id))]
    pub async fn sync_attempt(&self, record: &Record, retry_count: u32) -> SyncResult {
        let _timer = LatencyTimer::new("sync_one");

        let Some(id) = self.mapper.record_id(record) else {
            warn!("Refusing to sync grievance without an identifier");
            let result = SyncResult::rejected(
                "Grievance sync failed",
                Some(SyncError::MissingIdentifier.to_string()),
            )
            .with_retry_count(retry_count);
            return self.append(result);
        };
        tracing::Span::current().record("record_id", id.as_str());
        debug!(status = %SyncStatus::InProgress, retry_count, "Syncing grievance");

        let remote = self.mapper.to_remote(record);
        let result = match self.store.upsert(&remote).await {
            Ok(rows_affected) => {
                info!(rows_affected, "Grievance synced to GRM");
                SyncResult::success(
                    id.as_str(),
                    format!("Grievance {} synced to GRM", id),
                    Value::Object(remote),
                )
            }
            Err(e) => {
                let err = SyncError::from(e);
                warn!(error = %err, retryable = err.is_retryable(), "Grievance sync failed");
                SyncResult::failure(id.as_str(), format!("Grievance {} sync failed", id), err.to_string())
                    .with_retryable(err.is_retryable())
            }
        };
        self.append(result.with_retry_count(retry_count))
    }

    /// Sync records one after another, in input order, pausing between them.
    /// A failure does not stop the batch.
    #[tracing::instrument(skip(self, records), fields(total = records.len()))]
    pub async fn sync_batch(&self, records: &[Record]) -> BatchReport {
        let batch_id = Uuid::new_v4().to_string();
        let _timer = LatencyTimer::new("sync_batch");
        metrics::record_batch_size(records.len());
        info!(batch_id = %batch_id, "Starting batch sync");

        let mut results = Vec::with_capacity(records.len());
        for (idx, record) in records.iter().enumerate() {
            if idx > 0 {
                self.pacer.pause().await;
            }
            results.push(self.sync_one(record).await);
        }

        let summary = BatchSummary::from_results(&results);
        info!(
            batch_id = %batch_id,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Batch sync complete"
        );
        BatchReport {
            batch_id,
            results,
            summary,
        }
    }

    /// Remote record in local shape. `Ok(None)` when the GRM has no such id.
    pub async fn get_status(&self, id: &str) -> Result<Option<Record>, SyncError> {
        let remote = self.store.fetch(id).await?;
        Ok(remote.map(|row| self.mapper.to_local(&row)))
    }

    /// Write a local status (translated to its remote value) and optional
    /// notes. `true` iff at least one row was affected.
    pub async fn update_status(
        &self,
        id: &str,
        local_status: &str,
        notes: Option<&str>,
    ) -> Result<bool, SyncError> {
        let remote_status = self.mapper.statuses().to_remote(local_status);
        let affected = self.store.update_status(id, remote_status, notes).await?;
        if affected == 0 {
            debug!(record_id = id, "Status update matched no remote row");
        } else {
            info!(record_id = id, local_status, remote_status, "Remote status updated");
        }
        Ok(affected > 0)
    }

    /// Record that `failed` may be attempted again, when it is retryable and
    /// the retry budget allows. The marker carries the back-off the scheduler
    /// should observe. Nothing is retried here.
    pub fn schedule_retry(&self, failed: &SyncResult) -> Option<SyncResult> {
        if failed.status != SyncStatus::Failed || !failed.retryable {
            return None;
        }
        if !self.retry_policy.allows(failed.retry_count) {
            info!(
                record_id = failed.record_id.as_deref().unwrap_or_default(),
                retry_count = failed.retry_count,
                "Retry budget exhausted"
            );
            return None;
        }

        let next = failed.retry_count + 1;
        let max = self.retry_policy.max_retries.unwrap_or(usize::MAX);
        let delay = self.retry_policy.delay_for(failed.retry_count);
        let marker = SyncResult::retry_marker(
            failed.record_id.clone(),
            next,
            format!("Retry {}/{} scheduled", next, max),
            json!({
                "next_attempt_after_secs": delay.as_secs(),
                "max_retries": max,
                "last_error": failed.error,
            }),
        );
        debug!(retry_count = next, delay_secs = delay.as_secs(), "Retry scheduled");
        Some(self.append(marker))
    }

    /// Statistics derived from the current history.
    pub fn stats(&self) -> SyncStatistics {
        SyncStatistics::from_history(&self.history.read())
    }

    /// Snapshot of the history, oldest first.
    pub fn history(&self) -> Vec<SyncResult> {
        self.history.read().clone()
    }

    fn append(&self, result: SyncResult) -> SyncResult {
        metrics::record_sync_outcome(result.status.as_str());
        self.history.write().push(result.clone());
        result
    }
}
