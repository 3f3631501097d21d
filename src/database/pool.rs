// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bounded connection pool over the `sqlx` Any driver.
//!
//! Connections are handed out as [`Lease`]s. A lease is an RAII guard: when
//! it drops (normal return, `?`, panic) a pooled connection goes back to the
//! pool and a direct connection is closed.
//!
//! If the pool cannot be built at startup the pool switches to direct mode
//! and opens one connection per lease. Slower, but the integration keeps
//! working.

use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::sync::Once;
use std::time::{Duration, Instant};

use sqlx::any::AnyPoolOptions;
use sqlx::AnyConnection;
use sqlx::pool::PoolConnection;
use sqlx::{Any, AnyPool, Connection};
use tracing::{debug, info, warn};

use crate::config::{redact_url, ConnectionConfig};
use crate::resilience::retry::{retry, RetryConfig};

use super::error::DbError;

/// Boxed future returned by scoped-connection callbacks.
pub type ConnFuture<'c, T> = Pin<Box<dyn Future<Output = Result<T, DbError>> + Send + 'c>>;

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolMode {
    Pooled,
    /// Pool failed to initialise; one connection per lease
    Direct,
}

impl std::fmt::Display for PoolMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pooled => write!(f, "pooled"),
            Self::Direct => write!(f, "direct"),
        }
    }
}

/// Point-in-time pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub mode: PoolMode,
    pub size: u32,
    pub idle: usize,
    pub max_size: u32,
}

enum Backend {
    Pooled(AnyPool),
    Direct,
}

pub struct ConnectionPool {
    backend: Backend,
    url: String,
    is_sqlite: bool,
    max_size: u32,
    acquire_timeout: Duration,
}

impl ConnectionPool {
    /// Build a pool against `host:port` (the tunnel's local end when one is
    /// active). Falls back to direct mode if the pool cannot connect.
    pub async fn connect(config: &ConnectionConfig, host: &str, port: u16) -> Result<Self, DbError> {
        Self::connect_with_retry(config, host, port, &RetryConfig::startup()).await
    }

    pub async fn connect_with_retry(
        config: &ConnectionConfig,
        host: &str,
        port: u16,
        retry_config: &RetryConfig,
    ) -> Result<Self, DbError> {
        install_drivers();

        let url = config.url_for(host, port);
        let is_sqlite = url.starts_with("sqlite:");
        let connect_timeout = config.connect_timeout();
        let start = Instant::now();

        let result = retry("db_pool_connect", retry_config, || async {
            let options = AnyPoolOptions::new()
                .max_connections(config.pool_size)
                .acquire_timeout(config.acquire_timeout())
                .idle_timeout(config.idle_timeout());
            match tokio::time::timeout(connect_timeout, options.connect(&url)).await {
                Ok(Ok(pool)) => Ok(pool),
                Ok(Err(e)) => Err(connect_error(e)),
                Err(_) => Err(DbError::Timeout {
                    operation: "connect",
                    after: connect_timeout,
                }),
            }
        })
        .await;

        let backend = match result {
            Ok(pool) => {
                info!(
                    url = %redact_url(&url),
                    max_connections = config.pool_size,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Database pool ready"
                );
                Backend::Pooled(pool)
            }
            Err(DbError::Configuration(msg)) => return Err(DbError::Configuration(msg)),
            Err(e) => {
                warn!(
                    url = %redact_url(&url),
                    error = %e,
                    "Pool initialisation failed, falling back to direct connections"
                );
                crate::metrics::record_connection_error("pool");
                Backend::Direct
            }
        };

        Ok(Self {
            backend,
            url,
            is_sqlite,
            max_size: config.pool_size,
            acquire_timeout: config.acquire_timeout(),
        })
    }

    /// Use an already-built pool (shared with other components).
    pub fn from_pool(pool: AnyPool, url: &str, acquire_timeout: Duration) -> Self {
        let max_size = pool.options().get_max_connections();
        Self {
            backend: Backend::Pooled(pool),
            url: url.to_string(),
            is_sqlite: url.starts_with("sqlite:"),
            max_size,
            acquire_timeout,
        }
    }

    /// Direct mode from the start, no pool.
    pub fn direct(url: &str, acquire_timeout: Duration) -> Self {
        install_drivers();
        Self {
            backend: Backend::Direct,
            url: url.to_string(),
            is_sqlite: url.starts_with("sqlite:"),
            max_size: 1,
            acquire_timeout,
        }
    }

    #[must_use]
    pub fn mode(&self) -> PoolMode {
        match self.backend {
            Backend::Pooled(_) => PoolMode::Pooled,
            Backend::Direct => PoolMode::Direct,
        }
    }

    #[must_use]
    pub fn is_sqlite(&self) -> bool {
        self.is_sqlite
    }

    #[must_use]
    pub fn status(&self) -> PoolStatus {
        match &self.backend {
            Backend::Pooled(pool) => PoolStatus {
                mode: PoolMode::Pooled,
                size: pool.size(),
                idle: pool.num_idle(),
                max_size: self.max_size,
            },
            Backend::Direct => PoolStatus {
                mode: PoolMode::Direct,
                size: 0,
                idle: 0,
                max_size: self.max_size,
            },
        }
    }

    /// Lease a connection for one unit of work.
    pub async fn acquire(&self) -> Result<Lease, DbError> {
        let start = Instant::now();
        let inner = match &self.backend {
            Backend::Pooled(pool) => {
                let conn = tokio::time::timeout(self.acquire_timeout, pool.acquire())
                    .await
                    .map_err(|_| DbError::Timeout {
                        operation: "acquire",
                        after: self.acquire_timeout,
                    })?
                    .map_err(connect_error)?;
                LeaseInner::Pooled(conn)
            }
            Backend::Direct => {
                let conn = tokio::time::timeout(self.acquire_timeout, AnyConnection::connect(&self.url))
                    .await
                    .map_err(|_| DbError::Timeout {
                        operation: "connect",
                        after: self.acquire_timeout,
                    })?
                    .map_err(connect_error)?;
                LeaseInner::Direct(conn)
            }
        };
        debug!(
            mode = %self.mode(),
            wait_ms = start.elapsed().as_millis() as u64,
            "Connection acquired"
        );
        Ok(Lease {
            inner: Some(inner),
            acquired_at: Instant::now(),
        })
    }

    /// Acquire, run `op`, release. The lease is released on every exit path.
    pub async fn with_connection<T, F>(&self, op: F) -> Result<T, DbError>
    where
        T: Send + 'static,
        F: for<'c> FnOnce(&'c mut AnyConnection) -> ConnFuture<'c, T> + Send,
    {
        let mut lease = self.acquire().await?;
        op(&mut *lease).await
    }

    /// Close the pool. Outstanding leases finish normally.
    pub async fn close(&self) {
        if let Backend::Pooled(pool) = &self.backend {
            pool.close().await;
            info!("Database pool closed");
        }
    }
}

/// Connect-time failures are connection-class unless the URL itself is bad.
fn connect_error(err: sqlx::Error) -> DbError {
    match err {
        sqlx::Error::Configuration(_) => DbError::Configuration(err.to_string()),
        other => DbError::Connection(other.to_string()),
    }
}

enum LeaseInner {
    Pooled(PoolConnection<Any>),
    Direct(AnyConnection),
}

/// An exclusively-owned connection for one logical operation.
pub struct Lease {
    inner: Option<LeaseInner>,
    acquired_at: Instant,
}

impl Lease {
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

impl Deref for Lease {
    type Target = AnyConnection;

    fn deref(&self) -> &AnyConnection {
        match self.inner.as_ref() {
            Some(LeaseInner::Pooled(conn)) => conn,
            Some(LeaseInner::Direct(conn)) => conn,
            None => unreachable!("lease used after release"),
        }
    }
}

impl DerefMut for Lease {
    fn deref_mut(&mut self) -> &mut AnyConnection {
        match self.inner.as_mut() {
            Some(LeaseInner::Pooled(conn)) => conn,
            Some(LeaseInner::Direct(conn)) => conn,
            None => unreachable!("lease used after release"),
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        let mode = match self.inner.take() {
            Some(LeaseInner::Pooled(_)) => "pooled",
            Some(LeaseInner::Direct(_)) => "direct",
            None => return,
        };
        debug!(
            mode,
            held_ms = self.acquired_at.elapsed().as_millis() as u64,
            "Connection released"
        );
    }
}
