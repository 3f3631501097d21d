// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync orchestrator.
//!
//! The [`SyncOrchestrator`] maps local grievances to the remote schema,
//! upserts them through a [`GrmStore`], and records every outcome in an
//! append-only history.
//!
//! # Attempt lifecycle
//!
//! ```text
//! PENDING → IN_PROGRESS → SUCCESS
//!                       → FAILED ──(retryable, budget left)──► RETRY marker
//! ```
//!
//! `PENDING` and `IN_PROGRESS` are transient. Only SUCCESS, FAILED and RETRY
//! markers reach the history. Retries are executed by the external
//! scheduler: [`SyncOrchestrator::schedule_retry`] only records that another
//! attempt is allowed and when.
//!
//! # Example
//!
//! ```rust
//! use grm_sync::config::IntegrationConfig;
//! use grm_sync::coordinator::{NoDelay, SyncOrchestrator};
//! use grm_sync::mapping::FieldMapper;
//! use grm_sync::storage::{InMemoryGrmStore, TableLayout};
//! use grm_sync::SyncStatus;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let config = IntegrationConfig::default();
//! let mapper = Arc::new(FieldMapper::default());
//! let store = Arc::new(InMemoryGrmStore::new(TableLayout::from_mapper(&mapper, &config)));
//! let orchestrator = SyncOrchestrator::new(mapper, store, &config).with_pacer(Arc::new(NoDelay));
//!
//! let record = json!({"id": "GR-1", "description": "dust complaint", "status": "submitted"});
//! let result = orchestrator.sync_one(record.as_object().unwrap()).await;
//! assert_eq!(result.status, SyncStatus::Success);
//! assert_eq!(orchestrator.stats().succeeded, 1);
//! # }
//! ```

mod api;
mod pacing;
mod types;

pub use pacing::{FixedDelay, NoDelay, Pacer};
pub use types::{BatchReport, BatchSummary, SyncError};

use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::IntegrationConfig;
use crate::mapping::FieldMapper;
use crate::resilience::retry::RetryConfig;
use crate::storage::GrmStore;
use crate::sync_result::SyncResult;

pub struct SyncOrchestrator {
    mapper: Arc<FieldMapper>,
    store: Arc<dyn GrmStore>,
    pacer: Arc<dyn Pacer>,
    /// Back-off handed to the scheduler with RETRY markers
    retry_policy: RetryConfig,
    /// Append-only, chronological
    history: RwLock<Vec<SyncResult>>,
}

impl SyncOrchestrator {
    pub fn new(mapper: Arc<FieldMapper>, store: Arc<dyn GrmStore>, config: &IntegrationConfig) -> Self {
        Self {
            mapper,
            store,
            pacer: Arc::new(FixedDelay(config.batch_delay())),
            retry_policy: RetryConfig::scheduler(
                std::time::Duration::from_secs(config.retry_delay_secs),
                config.retry_count,
            ),
            history: RwLock::new(Vec::new()),
        }
    }

    /// Replace the batch pacing policy.
    #[must_use]
    pub fn with_pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn mapper(&self) -> &FieldMapper {
        &self.mapper
    }

    pub fn store(&self) -> &Arc<dyn GrmStore> {
        &self.store
    }

    pub fn retry_policy(&self) -> &RetryConfig {
        &self.retry_policy
    }
}
