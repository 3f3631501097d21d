// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;

use super::IntegrationFacade;
use crate::config::Settings;
use crate::coordinator::Pacer;
use crate::mapping::FieldMapper;
use crate::resilience::retry::RetryConfig;
use crate::storage::GrmStore;
use crate::tunnel::{SecureChannel, SshConnector, TunnelConnector};

/// Injects collaborators into an [`IntegrationFacade`].
///
/// Anything not set falls back to production defaults: SSH connector, SQL
/// store over a pool built at `initialize()`, fixed batch delay from config,
/// and the startup retry preset.
pub struct IntegrationFacadeBuilder {
    settings: Settings,
    mapper: Option<FieldMapper>,
    connector: Option<Arc<dyn TunnelConnector>>,
    store: Option<Arc<dyn GrmStore>>,
    pacer: Option<Arc<dyn Pacer>>,
    startup_retry: Option<RetryConfig>,
}

impl IntegrationFacadeBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            mapper: None,
            connector: None,
            store: None,
            pacer: None,
            startup_retry: None,
        }
    }

    #[must_use]
    pub fn with_mapper(mut self, mapper: FieldMapper) -> Self {
        self.mapper = Some(mapper);
        self
    }

    #[must_use]
    pub fn with_connector(mut self, connector: Arc<dyn TunnelConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Use this store instead of building a SQL store at `initialize()`.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn GrmStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn with_pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.pacer = Some(pacer);
        self
    }

    /// Retry policy for the initial pool connect.
    #[must_use]
    pub fn with_startup_retry(mut self, retry: RetryConfig) -> Self {
        self.startup_retry = Some(retry);
        self
    }

    pub fn build(self) -> IntegrationFacade {
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(SshConnector));
        IntegrationFacade {
            channel: SecureChannel::with_connector(self.settings.tunnel.clone(), connector),
            mapper: Arc::new(self.mapper.unwrap_or_default()),
            injected_store: self.store,
            pacer: self.pacer,
            startup_retry: self.startup_retry.unwrap_or_else(RetryConfig::startup),
            lifecycle: Mutex::new(()),
            session: RwLock::new(None),
            settings: self.settings,
        }
    }
}
