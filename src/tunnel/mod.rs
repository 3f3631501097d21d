// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Optional encrypted tunnel to the GRM database host.
//!
//! # State Machine
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──ok──► Active
//!      ▲                          │                 │
//!      └────────── failure ───────┘                 │
//!      └─────────────────── disconnect() ───────────┘
//! ```
//!
//! Transitions are serialized by one async mutex per channel, so concurrent
//! `connect()`/`disconnect()` calls from several workers cannot interleave.
//! [`SecureChannel::is_active`] and [`SecureChannel::info`] read a snapshot
//! and never wait on a transition in progress.
//!
//! The transport sits behind [`TunnelConnector`] so tests and embedders can
//! swap the SSH implementation for a fake.

pub mod auth;
pub mod ssh;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::TunnelConfig;
pub use auth::TunnelAuth;
pub use ssh::SshConnector;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TunnelError {
    #[error("No usable tunnel credential: configure a key file that exists or a password")]
    AuthenticationUnavailable,

    #[error("Tunnel authentication failed: {0}")]
    Authentication(String),

    #[error("Tunnel transport error: {0}")]
    Transport(String),

    #[error("Cannot bind local tunnel endpoint: {0}")]
    Bind(String),

    #[error("Tunnel connect timed out after {0:?}")]
    Timeout(Duration),

    #[error("Tunnel is disabled by configuration")]
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TunnelState {
    Disconnected,
    Connecting,
    Active,
}

impl std::fmt::Display for TunnelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Active => write!(f, "active"),
        }
    }
}

/// Snapshot of a channel for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TunnelInfo {
    pub enabled: bool,
    pub state: TunnelState,
    pub ssh_host: Option<String>,
    pub ssh_port: u16,
    /// Database endpoint as seen from the SSH server
    pub remote_bind: String,
    /// Local listener, while active
    pub local_addr: Option<SocketAddr>,
}

/// Establishes a forwarding transport.
#[async_trait]
pub trait TunnelConnector: Send + Sync {
    async fn open(
        &self,
        config: &TunnelConfig,
        auth: &TunnelAuth,
    ) -> Result<Box<dyn TunnelTransport>, TunnelError>;
}

/// A live forward. Owned exclusively by one [`SecureChannel`].
#[async_trait]
pub trait TunnelTransport: Send + Sync {
    fn local_addr(&self) -> SocketAddr;

    async fn close(&mut self) -> Result<(), TunnelError>;
}

#[derive(Clone, Copy)]
struct Snapshot {
    state: TunnelState,
    local_addr: Option<SocketAddr>,
}

pub struct SecureChannel {
    config: TunnelConfig,
    connector: Arc<dyn TunnelConnector>,
    transport: Mutex<Option<Box<dyn TunnelTransport>>>,
    snapshot: RwLock<Snapshot>,
}

impl SecureChannel {
    pub fn new(config: TunnelConfig) -> Self {
        Self::with_connector(config, Arc::new(SshConnector))
    }

    pub fn with_connector(config: TunnelConfig, connector: Arc<dyn TunnelConnector>) -> Self {
        Self {
            config,
            connector,
            transport: Mutex::new(None),
            snapshot: RwLock::new(Snapshot {
                state: TunnelState::Disconnected,
                local_addr: None,
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Bring the tunnel up. `false` when disabled or on any failure; the
    /// cause is logged and the channel is left disconnected.
    pub async fn connect(&self) -> bool {
        if !self.config.enabled {
            debug!("Tunnel disabled, using direct connection");
            return false;
        }
        match self.open().await {
            Ok(_) => true,
            Err(e) => {
                error!(
                    ssh_host = self.config.ssh_host.as_deref().unwrap_or_default(),
                    error = %e,
                    "Tunnel connect failed"
                );
                false
            }
        }
    }

    /// Bring the tunnel up and return the local endpoint. Idempotent: an
    /// active tunnel is returned as-is.
    pub async fn open(&self) -> Result<SocketAddr, TunnelError> {
        if !self.config.enabled {
            return Err(TunnelError::Disabled);
        }

        let mut transport = self.transport.lock().await;
        if let Some(existing) = transport.as_ref() {
            return Ok(existing.local_addr());
        }

        self.set_state(TunnelState::Connecting, None);
        let timeout = self.config.connect_timeout();
        let opened = async {
            let auth = auth::resolve(&self.config)?;
            info!(
                ssh_host = self.config.ssh_host.as_deref().unwrap_or_default(),
                ssh_port = self.config.ssh_port,
                method = auth.method(),
                "Opening tunnel"
            );
            tokio::time::timeout(timeout, self.connector.open(&self.config, &auth))
                .await
                .map_err(|_| TunnelError::Timeout(timeout))?
        }
        .await;

        match opened {
            Ok(t) => {
                let addr = t.local_addr();
                *transport = Some(t);
                self.set_state(TunnelState::Active, Some(addr));
                crate::metrics::set_backend_healthy("tunnel", true);
                info!(local = %addr, "Tunnel active");
                Ok(addr)
            }
            Err(e) => {
                self.set_state(TunnelState::Disconnected, None);
                crate::metrics::record_connection_error("tunnel");
                Err(e)
            }
        }
    }

    /// Tear the tunnel down. Safe to call repeatedly or before `connect()`;
    /// state is cleared even if closing the transport fails.
    pub async fn disconnect(&self) {
        let mut transport = self.transport.lock().await;
        if let Some(mut t) = transport.take() {
            if let Err(e) = t.close().await {
                warn!(error = %e, "Error closing tunnel transport");
            }
            info!("Tunnel closed");
        }
        self.set_state(TunnelState::Disconnected, None);
    }

    pub fn is_active(&self) -> bool {
        self.snapshot.read().state == TunnelState::Active
    }

    /// Local endpoint while active.
    pub fn local_endpoint(&self) -> Option<SocketAddr> {
        let snap = self.snapshot.read();
        match snap.state {
            TunnelState::Active => snap.local_addr,
            _ => None,
        }
    }

    pub fn info(&self) -> TunnelInfo {
        let snap = *self.snapshot.read();
        TunnelInfo {
            enabled: self.config.enabled,
            state: snap.state,
            ssh_host: self.config.ssh_host.clone(),
            ssh_port: self.config.ssh_port,
            remote_bind: format!(
                "{}:{}",
                self.config.remote_bind_host, self.config.remote_bind_port
            ),
            local_addr: snap.local_addr,
        }
    }

    fn set_state(&self, state: TunnelState, local_addr: Option<SocketAddr>) {
        let mut snap = self.snapshot.write();
        if snap.state != state {
            debug!(from = %snap.state, to = %state, "Tunnel state change");
            crate::metrics::set_tunnel_state(&state.to_string());
        }
        *snap = Snapshot { state, local_addr };
        if state != TunnelState::Active {
            crate::metrics::set_backend_healthy("tunnel", false);
        }
    }
}
