// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync outcome types.
//!
//! A [`SyncResult`] is produced for every synchronisation attempt and appended
//! to the orchestrator's history. [`SyncStatistics`] is always derived from
//! that history, never stored separately.
//!
//! # Example
//!
//! ```
//! use grm_sync::{SyncResult, SyncStatistics, SyncStatus};
//! use serde_json::json;
//!
//! let ok = SyncResult::success("GR-1", "synced", json!({"grievance_id": "GR-1"}));
//! let failed = SyncResult::failure("GR-2", "remote write failed", "connection refused");
//!
//! assert_eq!(ok.status, SyncStatus::Success);
//! assert!(!failed.success);
//!
//! let stats = SyncStatistics::from_history(&[ok, failed]);
//! assert_eq!(stats.total, 2);
//! assert_eq!(stats.success_rate, 50.0);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// State of a sync attempt.
///
/// `Pending` and `InProgress` are transient and never appear in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    InProgress,
    Success,
    Failed,
    Retry,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Retry => "retry",
        }
    }

    /// Whether this state is recorded in history.
    #[must_use]
    pub fn is_recorded(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Retry)
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one synchronisation attempt. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub success: bool,
    pub status: SyncStatus,
    pub message: String,
    /// Identifier of the record this result is about, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the failure is worth retrying (connection-class errors)
    #[serde(default)]
    pub retryable: bool,
    #[serde(default)]
    pub retry_count: u32,
    pub timestamp: DateTime<Utc>,
}

impl SyncResult {
    fn base(success: bool, status: SyncStatus, message: impl Into<String>) -> Self {
        Self {
            success,
            status,
            message: message.into(),
            record_id: None,
            data: None,
            error: None,
            retryable: false,
            retry_count: 0,
            timestamp: Utc::now(),
        }
    }

    pub fn success(record_id: impl Into<String>, message: impl Into<String>, data: Value) -> Self {
        let mut result = Self::base(true, SyncStatus::Success, message);
        result.record_id = Some(record_id.into());
        result.data = Some(data);
        result
    }

    pub fn failure(
        record_id: impl Into<String>,
        message: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let mut result = Self::base(false, SyncStatus::Failed, message);
        result.record_id = Some(record_id.into());
        result.error = Some(error.into());
        result
    }

    /// A failure not tied to any record (guards, malformed input).
    pub fn rejected(message: impl Into<String>, error: Option<String>) -> Self {
        let mut result = Self::base(false, SyncStatus::Failed, message);
        result.error = error;
        result
    }

    /// A marker telling the scheduler that another attempt is allowed.
    pub fn retry_marker(
        record_id: Option<String>,
        retry_count: u32,
        message: impl Into<String>,
        data: Value,
    ) -> Self {
        let mut result = Self::base(false, SyncStatus::Retry, message);
        result.record_id = record_id;
        result.retry_count = retry_count;
        result.data = Some(data);
        result
    }

    #[must_use]
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    #[must_use]
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Counts derived from a sync history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatistics {
    /// Terminal attempts (successes + failures)
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// RETRY markers handed to the scheduler
    pub retries: usize,
    /// Percentage, rounded to two decimals
    pub success_rate: f64,
    pub last_sync: Option<DateTime<Utc>>,
}

impl SyncStatistics {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            total: 0,
            succeeded: 0,
            failed: 0,
            retries: 0,
            success_rate: 0.0,
            last_sync: None,
        }
    }

    /// Recompute statistics from an ordered history.
    #[must_use]
    pub fn from_history(history: &[SyncResult]) -> Self {
        let mut stats = Self::empty();
        for result in history {
            match result.status {
                SyncStatus::Success => stats.succeeded += 1,
                SyncStatus::Failed => stats.failed += 1,
                SyncStatus::Retry => {
                    stats.retries += 1;
                    continue;
                }
                SyncStatus::Pending | SyncStatus::InProgress => continue,
            }
            stats.last_sync = Some(result.timestamp);
        }
        stats.total = stats.succeeded + stats.failed;
        if stats.total > 0 {
            let rate = stats.succeeded as f64 / stats.total as f64 * 100.0;
            stats.success_rate = (rate * 100.0).round() / 100.0;
        }
        stats
    }
}

impl Default for SyncStatistics {
    fn default() -> Self {
        Self::empty()
    }
}
