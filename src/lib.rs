// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # GRM Sync
//!
//! Pushes locally captured grievances into a remote Grievance Redress
//! Mechanism (GRM) database and reads their status back.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    IntegrationFacade                        │
//! │  • initialize() / cleanup() lifecycle                      │
//! │  • "not initialized" guard on every operation              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SyncOrchestrator                         │
//! │  • FieldMapper: local ⇄ remote fields and statuses         │
//! │  • Append-only history, statistics, retry markers          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              GrmStore → QueryExecutor → ConnectionPool      │
//! │  • Parameterized upsert/select/update with timeouts        │
//! │  • Pooled connections, direct-connection fallback          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                   (optional SecureChannel)
//!                              ▼
//!                     remote MySQL GRM host
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use grm_sync::{IntegrationFacade, Settings};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::load()?;
//!     grm_sync::logging::init(&settings.integration.log_level);
//!
//!     let grm = IntegrationFacade::new(settings);
//!     if !grm.initialize().await {
//!         return Ok(());
//!     }
//!
//!     let record = json!({"id": "GR-1", "description": "dust", "status": "submitted"});
//!     let result = grm.process(record.as_object().unwrap()).await;
//!     println!("{}: {}", result.status, result.message);
//!
//!     grm.cleanup().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`integration`]: the [`IntegrationFacade`] entry point
//! - [`coordinator`]: the [`SyncOrchestrator`]
//! - [`mapping`]: field and status translation
//! - [`storage`]: remote grievance table behind [`storage::GrmStore`]
//! - [`database`]: connection pool and query executor
//! - [`tunnel`]: optional SSH port forward
//! - [`resilience`]: retry policies

pub mod config;
pub mod coordinator;
pub mod database;
pub mod integration;
pub mod logging;
pub mod mapping;
pub mod metrics;
pub mod resilience;
pub mod storage;
pub mod sync_result;
pub mod tunnel;

pub use self::config::{ConfigError, Settings};
pub use coordinator::{BatchReport, SyncError, SyncOrchestrator};
pub use database::DbError;
pub use integration::{IntegrationFacade, IntegrationStatus};
pub use mapping::{FieldMapper, Record};
pub use self::metrics::LatencyTimer;
pub use resilience::retry::RetryConfig;
pub use sync_result::{SyncResult, SyncStatistics, SyncStatus};
pub use tunnel::{SecureChannel, TunnelInfo};
