// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the sync orchestrator.

use serde::Serialize;
use thiserror::Error;

use crate::database::DbError;
use crate::sync_result::{SyncResult, SyncStatus};

/// Why a record failed to reach the remote store.
///
/// Only used inside the orchestrator; callers receive it as the error
/// detail of a FAILED [`SyncResult`].
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("record has no usable identifier")]
    MissingIdentifier,

    #[error("remote write failed: {0}")]
    Remote(#[from] DbError),
}

impl SyncError {
    /// Connection-class failures may succeed on a later attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::MissingIdentifier => false,
            Self::Remote(e) => e.is_retryable(),
        }
    }
}

/// Counts for one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn from_results(results: &[SyncResult]) -> Self {
        let succeeded = results
            .iter()
            .filter(|r| r.status == SyncStatus::Success)
            .count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
        }
    }

    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Result of [`super::SyncOrchestrator::sync_batch`]. `results` is in input
/// order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub batch_id: String,
    pub results: Vec<SyncResult>,
    pub summary: BatchSummary,
}
