// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the GRM integration.
//!
//! Uses the `metrics` crate for backend-agnostic collection. The host
//! application chooses the exporter; without one installed every call here
//! is a no-op.
//!
//! # Metric Naming Convention
//! - `grm_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `operation`: query, update, insert, transaction, sync_one, sync_batch
//! - `status`: success, error
//! - `backend`: pool, tunnel, database

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record a database operation outcome
pub fn record_operation(operation: &str, status: &str) {
    counter!(
        "grm_sync_db_operations_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(operation: &str, duration: Duration) {
    histogram!(
        "grm_sync_operation_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record rows returned or affected by a statement
pub fn record_rows(operation: &str, rows: u64) {
    histogram!(
        "grm_sync_db_rows",
        "operation" => operation.to_string()
    )
    .record(rows as f64);
}

/// Record a categorised database error
pub fn record_error(operation: &str, error_type: &str) {
    counter!(
        "grm_sync_errors_total",
        "operation" => operation.to_string(),
        "error_type" => error_type.to_string()
    )
    .increment(1);
}

/// Record a connection/backend error
pub fn record_connection_error(backend: &str) {
    counter!(
        "grm_sync_connection_errors_total",
        "backend" => backend.to_string()
    )
    .increment(1);
}

/// Set backend health status (1 = healthy, 0 = unhealthy)
pub fn set_backend_healthy(backend: &str, healthy: bool) {
    gauge!(
        "grm_sync_backend_healthy",
        "backend" => backend.to_string()
    )
    .set(if healthy { 1.0 } else { 0.0 });
}

/// Record a terminal or retry sync outcome
pub fn record_sync_outcome(status: &str) {
    counter!(
        "grm_sync_records_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record batch size
pub fn record_batch_size(count: usize) {
    histogram!("grm_sync_batch_size").record(count as f64);
}

/// Track tunnel state transitions
pub fn set_tunnel_state(state: &str) {
    counter!(
        "grm_sync_tunnel_state_transitions_total",
        "state" => state.to_string()
    )
    .increment(1);
}

/// Record facade startup duration
pub fn record_startup(duration: Duration, success: bool) {
    let status = if success { "success" } else { "failure" };
    histogram!(
        "grm_sync_startup_seconds",
        "status" => status
    )
    .record(duration.as_secs_f64());
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.operation, self.start.elapsed());
    }
}
