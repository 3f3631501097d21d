// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote database access.
//!
//! - [`ConnectionPool`]: bounded pool with a direct-connection fallback and
//!   RAII connection leases
//! - [`QueryExecutor`]: parameterized query/update/insert, transactions and
//!   schema introspection, each with a timeout and timing log

pub mod error;
pub mod executor;
pub mod pool;

pub use error::DbError;
pub use executor::{execute, fetch_rows, ColumnInfo, DbRow, QueryExecutor, WriteOutcome};
pub use pool::{ConnFuture, ConnectionPool, Lease, PoolMode, PoolStatus};
