// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Exponential backoff.
//!
//! Two uses in this crate:
//!
//! - [`retry`] wraps startup operations (initial pool connect) that should
//!   ride out a briefly unavailable GRM host.
//! - [`RetryConfig::delay_for`] computes the back-off a scheduler should wait
//!   before re-attempting a failed record sync. The sync path itself never
//!   sleeps and retries.
//!
//! # Example
//!
//! ```
//! use grm_sync::RetryConfig;
//! use std::time::Duration;
//!
//! // Startup: a handful of quick attempts
//! let startup = RetryConfig::startup();
//! assert_eq!(startup.max_retries, Some(5));
//!
//! // Scheduler back-off from GRM_SYNC_RETRY_DELAY_SECS, doubling per attempt
//! let sched = RetryConfig::scheduler(Duration::from_secs(60), 3);
//! assert_eq!(sched.delay_for(0), Duration::from_secs(60));
//! assert_eq!(sched.delay_for(2), Duration::from_secs(240));
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Backoff parameters.
///
/// Presets:
/// - [`RetryConfig::startup()`] for the initial database connection
/// - [`RetryConfig::scheduler()`] for per-record retry scheduling
/// - [`RetryConfig::immediate()`] single attempt, no waiting
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    pub max_retries: Option<usize>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::startup()
    }
}

impl RetryConfig {
    /// 5 attempts, 200ms doubling to 2s. Gives up after roughly 5 seconds so
    /// a misconfigured host is reported quickly.
    #[must_use]
    pub fn startup() -> Self {
        Self {
            max_retries: Some(5),
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }

    /// Back-off for scheduling record retries: `base`, doubling, capped at
    /// one hour.
    #[must_use]
    pub fn scheduler(base: Duration, max_retries: u32) -> Self {
        Self {
            max_retries: Some(max_retries as usize),
            initial_delay: base,
            max_delay: Duration::from_secs(3600),
            factor: 2.0,
        }
    }

    /// One attempt, no delay.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            max_retries: Some(1),
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            factor: 1.0,
        }
    }

    /// Fast retry for tests (minimal delays)
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            max_retries: Some(3),
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            factor: 2.0,
        }
    }

    /// Delay before attempt `attempt + 1`, where attempt 0 is the first retry.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let scaled = self.initial_delay.as_secs_f64() * self.factor.powi(attempt.min(64) as i32);
        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(scaled)
    }

    /// Whether another attempt is allowed after `attempts` tries.
    #[must_use]
    pub fn allows(&self, attempts: u32) -> bool {
        self.max_retries.map_or(true, |max| (attempts as usize) < max)
    }
}

pub async fn retry<F, Fut, T, E>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = config.initial_delay;
    let mut attempts = 0;

    loop {
        match operation().await {
            Ok(val) => {
                if attempts > 0 {
                    info!(operation = operation_name, attempts, "Operation succeeded after retries");
                }
                return Ok(val);
            }
            Err(err) => {
                attempts += 1;

                match config.max_retries {
                    Some(max) if attempts >= max => return Err(err),
                    Some(max) => warn!(
                        operation = operation_name,
                        attempt = attempts,
                        max_attempts = max,
                        error = %err,
                        next_delay_ms = delay.as_millis() as u64,
                        "Operation failed, retrying"
                    ),
                    None => warn!(
                        operation = operation_name,
                        attempt = attempts,
                        error = %err,
                        next_delay_ms = delay.as_millis() as u64,
                        "Operation failed, will retry indefinitely"
                    ),
                }

                sleep(delay).await;
                delay = (delay.mul_f64(config.factor)).min(config.max_delay);
            }
        }
    }
}
