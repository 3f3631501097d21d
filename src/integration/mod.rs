// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Lifecycle wrapper invoked by task-queue workers.
//!
//! # Lifecycle
//!
//! ```text
//! new() ──initialize()──► tunnel (if enabled) ──► pool + store ──► health check ──► ready
//!   ▲                                                                                 │
//!   └──────────────────────────────── cleanup() ◄─────────────────────────────────────┘
//! ```
//!
//! Every data operation checks the initialized flag first. Before a
//! successful `initialize()` they return a FAILED "not initialized" result
//! and touch neither the tunnel nor the database.
//!
//! One facade may be shared by many workers (`Arc<IntegrationFacade>`);
//! `initialize()` and `cleanup()` are serialized.

mod builder;

pub use builder::IntegrationFacadeBuilder;

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::{ConfigError, Settings};
use crate::coordinator::{Pacer, SyncOrchestrator};
use crate::database::{ConnectionPool, DbError, QueryExecutor};
use crate::mapping::{FieldMapper, Record};
use crate::resilience::retry::RetryConfig;
use crate::storage::{GrmStore, SqlGrmStore, TableLayout};
use crate::sync_result::{SyncResult, SyncStatistics};
use crate::tunnel::{SecureChannel, TunnelError, TunnelInfo};

const NOT_INITIALIZED: &str = "GRM integration not initialized";

/// Why `initialize()` failed.
#[derive(Error, Debug)]
pub enum InitError {
    #[error("integration disabled by configuration")]
    Disabled,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tunnel(#[from] TunnelError),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error("database health check failed")]
    Unhealthy,
}

/// Health and configuration snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrationStatus {
    pub enabled: bool,
    pub initialized: bool,
    pub auto_sync: bool,
    pub sync_interval_secs: u64,
    pub tunnel: TunnelInfo,
    pub database_healthy: bool,
    pub statistics: SyncStatistics,
}

struct Session {
    orchestrator: Arc<SyncOrchestrator>,
    store: Arc<dyn GrmStore>,
}

pub struct IntegrationFacade {
    settings: Settings,
    mapper: Arc<FieldMapper>,
    channel: SecureChannel,
    injected_store: Option<Arc<dyn GrmStore>>,
    pacer: Option<Arc<dyn Pacer>>,
    startup_retry: RetryConfig,
    lifecycle: Mutex<()>,
    session: RwLock<Option<Session>>,
}

impl IntegrationFacade {
    /// Facade with the production SSH connector and SQL store.
    pub fn new(settings: Settings) -> Self {
        Self::builder(settings).build()
    }

    pub fn builder(settings: Settings) -> IntegrationFacadeBuilder {
        IntegrationFacadeBuilder::new(settings)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.integration.enabled
    }

    pub fn is_initialized(&self) -> bool {
        self.session.read().is_some()
    }

    /// Bring the integration up. `false` when disabled or on any failure;
    /// a failed start leaves nothing open. Idempotent.
    pub async fn initialize(&self) -> bool {
        match self.try_initialize().await {
            Ok(()) => true,
            Err(InitError::Disabled) => {
                info!("GRM integration disabled by configuration");
                false
            }
            Err(e) => {
                error!(error = %e, "GRM integration failed to initialize");
                false
            }
        }
    }

    /// [`initialize`](Self::initialize) with the failure cause.
    #[tracing::instrument(skip(self), fields(tunnel = self.settings.tunnel.enabled))]
    pub async fn try_initialize(&self) -> Result<(), InitError> {
        if !self.is_enabled() {
            return Err(InitError::Disabled);
        }
        self.check_settings()?;
        let _guard = self.lifecycle.lock().await;
        if self.is_initialized() {
            return Ok(());
        }

        let start = Instant::now();
        match self.bring_up().await {
            Ok(session) => {
                *self.session.write() = Some(session);
                crate::metrics::record_startup(start.elapsed(), true);
                info!(
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "GRM integration ready"
                );
                Ok(())
            }
            Err(e) => {
                self.channel.disconnect().await;
                crate::metrics::record_startup(start.elapsed(), false);
                Err(e)
            }
        }
    }

    /// Settings may be built in code, so they are checked again here before
    /// any tunnel or pool I/O. An injected store needs no database section.
    fn check_settings(&self) -> Result<(), ConfigError> {
        if self.injected_store.is_some() {
            self.settings.integration.validate()?;
            self.settings.tunnel.validate()
        } else {
            self.settings.validate()
        }
    }

    async fn bring_up(&self) -> Result<Session, InitError> {
        // Phase 1: tunnel, when configured. No silent fallback to direct.
        let (host, port) = if self.channel.is_enabled() {
            let local = self.channel.open().await?;
            (local.ip().to_string(), local.port())
        } else {
            self.settings.database.endpoint()
        };

        // Phase 2: store over a pool to the (possibly tunnelled) endpoint
        let store: Arc<dyn GrmStore> = match &self.injected_store {
            Some(store) => store.clone(),
            None => {
                let db = &self.settings.database;
                let pool = ConnectionPool::connect_with_retry(db, &host, port, &self.startup_retry).await?;
                let executor = Arc::new(QueryExecutor::new(Arc::new(pool), db.query_timeout()));
                let layout = TableLayout::from_mapper(&self.mapper, &self.settings.integration);
                Arc::new(SqlGrmStore::new(executor, layout))
            }
        };

        // Phase 3: health check
        if !store.ping().await {
            store.close().await;
            return Err(InitError::Unhealthy);
        }

        let mut orchestrator =
            SyncOrchestrator::new(self.mapper.clone(), store.clone(), &self.settings.integration);
        if let Some(pacer) = &self.pacer {
            orchestrator = orchestrator.with_pacer(pacer.clone());
        }
        Ok(Session {
            orchestrator: Arc::new(orchestrator),
            store,
        })
    }

    fn orchestrator(&self) -> Option<Arc<SyncOrchestrator>> {
        self.session.read().as_ref().map(|s| s.orchestrator.clone())
    }

    fn not_initialized(&self) -> SyncResult {
        let detail = if self.is_enabled() {
            "call initialize() before syncing"
        } else {
            "integration disabled by configuration"
        };
        SyncResult::rejected(NOT_INITIALIZED, Some(detail.to_string()))
    }

    /// Sync one grievance.
    pub async fn process(&self, record: &Record) -> SyncResult {
        match self.orchestrator() {
            Some(orchestrator) => orchestrator.sync_one(record).await,
            None => {
                warn!("process() called before initialize()");
                self.not_initialized()
            }
        }
    }

    /// Sync grievances in order. Results line up with `records`.
    pub async fn process_batch(&self, records: &[Record]) -> Vec<SyncResult> {
        match self.orchestrator() {
            Some(orchestrator) => orchestrator.sync_batch(records).await.results,
            None => {
                warn!(count = records.len(), "process_batch() called before initialize()");
                records.iter().map(|_| self.not_initialized()).collect()
            }
        }
    }

    /// Remote grievance in local shape. `None` when absent, on error, or
    /// before initialization.
    pub async fn get_status(&self, id: &str) -> Option<Record> {
        let orchestrator = self.orchestrator()?;
        match orchestrator.get_status(id).await {
            Ok(record) => record,
            Err(e) => {
                warn!(record_id = id, error = %e, "Status lookup failed");
                None
            }
        }
    }

    /// Update the remote status. `true` iff a row was affected.
    pub async fn update_status(&self, id: &str, local_status: &str, notes: Option<&str>) -> bool {
        let Some(orchestrator) = self.orchestrator() else {
            return false;
        };
        match orchestrator.update_status(id, local_status, notes).await {
            Ok(updated) => updated,
            Err(e) => {
                warn!(record_id = id, error = %e, "Status update failed");
                false
            }
        }
    }

    /// See [`SyncOrchestrator::schedule_retry`].
    pub fn schedule_retry(&self, failed: &SyncResult) -> Option<SyncResult> {
        self.orchestrator()?.schedule_retry(failed)
    }

    pub fn stats(&self) -> SyncStatistics {
        self.orchestrator()
            .map(|o| o.stats())
            .unwrap_or_default()
    }

    pub fn history(&self) -> Vec<SyncResult> {
        self.orchestrator()
            .map(|o| o.history())
            .unwrap_or_default()
    }

    pub async fn status(&self) -> IntegrationStatus {
        let store = self.session.read().as_ref().map(|s| s.store.clone());
        let database_healthy = match store {
            Some(store) => store.ping().await,
            None => false,
        };
        IntegrationStatus {
            enabled: self.is_enabled(),
            initialized: self.is_initialized(),
            auto_sync: self.settings.integration.auto_sync,
            sync_interval_secs: self.settings.integration.interval_secs,
            tunnel: self.channel.info(),
            database_healthy,
            statistics: self.stats(),
        }
    }

    /// Tear down pool and tunnel. Safe at any time, including before or
    /// after a failed `initialize()`.
    pub async fn cleanup(&self) {
        let _guard = self.lifecycle.lock().await;
        let session = self.session.write().take();
        if let Some(session) = session {
            session.store.close().await;
            info!("GRM integration session closed");
        }
        self.channel.disconnect().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IntegrationConfig;
    use crate::coordinator::NoDelay;
    use crate::storage::InMemoryGrmStore;
    use crate::sync_result::SyncStatus;
    use crate::tunnel::testing::{enabled_config, FakeConnector};
    use serde_json::json;

    fn settings(enabled: bool) -> Settings {
        Settings {
            integration: IntegrationConfig {
                enabled,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn memory_store() -> Arc<InMemoryGrmStore> {
        Arc::new(InMemoryGrmStore::new(TableLayout::from_mapper(
            &FieldMapper::default(),
            &IntegrationConfig::default(),
        )))
    }

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_disabled_initialize_is_noop() {
        let store = memory_store();
        let connector = Arc::new(FakeConnector::ok());
        let facade = IntegrationFacade::builder(settings(false))
            .with_store(store.clone())
            .with_connector(connector.clone())
            .build();

        assert!(!facade.initialize().await);
        assert!(matches!(facade.try_initialize().await, Err(InitError::Disabled)));
        assert_eq!(store.calls(), 0);
        assert_eq!(connector.opens(), 0);

        let result = facade.process(&record(json!({"id": "GR-1"}))).await;
        assert_eq!(result.status, SyncStatus::Failed);
        assert!(result.message.contains("not initialized"));
        assert_eq!(result.error.as_deref(), Some("integration disabled by configuration"));
    }

    #[tokio::test]
    async fn test_guard_before_initialize_does_no_io() {
        let store = memory_store();
        let facade = IntegrationFacade::builder(settings(true))
            .with_store(store.clone())
            .build();

        let result = facade.process(&record(json!({"id": "GR-1"}))).await;
        assert!(!result.success);
        assert!(result.message.contains("not initialized"));

        let batch = facade
            .process_batch(&[record(json!({"id": "a"})), record(json!({"id": "b"}))])
            .await;
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|r| r.status == SyncStatus::Failed));

        assert!(facade.get_status("GR-1").await.is_none());
        assert!(!facade.update_status("GR-1", "resolved", None).await);
        assert_eq!(store.calls(), 0);
        assert_eq!(facade.stats(), SyncStatistics::empty());
    }

    #[tokio::test]
    async fn test_initialize_process_cleanup() {
        let store = memory_store();
        let facade = IntegrationFacade::builder(settings(true))
            .with_store(store.clone())
            .with_pacer(Arc::new(NoDelay))
            .build();

        assert!(facade.initialize().await);
        assert!(facade.initialize().await);
        assert!(facade.is_initialized());

        let result = facade.process(&record(json!({"id": "GR-1", "status": "submitted"}))).await;
        assert!(result.success);

        let status = facade.status().await;
        assert!(status.initialized);
        assert!(status.database_healthy);
        assert_eq!(status.statistics.succeeded, 1);

        facade.cleanup().await;
        assert!(!facade.is_initialized());
        let after = facade.process(&record(json!({"id": "GR-2"}))).await;
        assert!(after.message.contains("not initialized"));
    }

    #[tokio::test]
    async fn test_unhealthy_store_fails_initialize() {
        let store = memory_store();
        store.set_healthy(false);
        let facade = IntegrationFacade::builder(settings(true))
            .with_store(store.clone())
            .build();

        assert!(matches!(facade.try_initialize().await, Err(InitError::Unhealthy)));
        assert!(!facade.is_initialized());
    }

    #[tokio::test]
    async fn test_tunnel_failure_is_hard_failure() {
        let store = memory_store();
        let connector = Arc::new(FakeConnector::failing(TunnelError::Transport("refused".into())));
        let mut settings = settings(true);
        settings.tunnel = enabled_config();
        let facade = IntegrationFacade::builder(settings)
            .with_store(store.clone())
            .with_connector(connector.clone())
            .build();

        assert!(!facade.initialize().await);
        assert_eq!(connector.opens(), 1);
        assert_eq!(store.calls(), 0, "no database access without the tunnel");
        assert!(facade.status().await.tunnel.local_addr.is_none());
    }

    #[tokio::test]
    async fn test_tunnel_opened_and_closed_with_session() {
        let connector = Arc::new(FakeConnector::ok());
        let mut settings = settings(true);
        settings.tunnel = enabled_config();
        let facade = IntegrationFacade::builder(settings)
            .with_store(memory_store())
            .with_connector(connector.clone())
            .build();

        assert!(facade.initialize().await);
        assert!(facade.status().await.tunnel.local_addr.is_some());

        facade.cleanup().await;
        facade.cleanup().await;
        assert_eq!(connector.closes(), 1);
    }

    #[tokio::test]
    async fn test_invalid_settings_fail_before_any_io() {
        let connector = Arc::new(FakeConnector::ok());
        let mut settings = settings(true);
        settings.tunnel = enabled_config();
        // No host, name, user or URL for the database
        let facade = IntegrationFacade::builder(settings)
            .with_connector(connector.clone())
            .build();

        match facade.try_initialize().await {
            Err(InitError::Config(ConfigError::Validation(msg))) => {
                assert!(msg.contains("GRM_DB_HOST"), "unexpected message: {msg}")
            }
            other => panic!("expected configuration error, got {:?}", other),
        }
        assert_eq!(connector.opens(), 0);
        assert!(!facade.is_initialized());
    }

    #[tokio::test]
    async fn test_invalid_tunnel_settings_rejected_with_injected_store() {
        let store = memory_store();
        let connector = Arc::new(FakeConnector::ok());
        let mut settings = settings(true);
        settings.tunnel = enabled_config();
        settings.tunnel.ssh_password = None;
        let facade = IntegrationFacade::builder(settings)
            .with_store(store.clone())
            .with_connector(connector.clone())
            .build();

        assert!(matches!(facade.try_initialize().await, Err(InitError::Config(_))));
        assert_eq!(connector.opens(), 0);
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_disabled_tunnel_never_connects() {
        let store = memory_store();
        let connector = Arc::new(FakeConnector::ok());
        let facade = IntegrationFacade::builder(settings(true))
            .with_store(store.clone())
            .with_connector(connector.clone())
            .build();

        assert!(facade.initialize().await);
        assert_eq!(connector.opens(), 0);
        assert!(!facade.status().await.tunnel.enabled);

        facade.cleanup().await;
        assert_eq!(connector.closes(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_without_initialize() {
        let facade = IntegrationFacade::new(settings(false));
        facade.cleanup().await;
        assert!(!facade.is_initialized());
    }
}
