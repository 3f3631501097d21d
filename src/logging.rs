// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Subscriber setup for embedders that do not install their own.
//!
//! The crate only emits `tracing` events. Hosts that already run a
//! subscriber should skip [`init`] entirely.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_level` (usually
/// `GRM_SYNC_LOG_LEVEL`, read into `IntegrationConfig::log_level`) is used.
/// Returns `false` if a global subscriber was already installed, which makes
/// repeated calls harmless.
pub fn init(default_level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        let _ = init("debug");
        assert!(!init("debug"));
        tracing::info!(component = "logging", "subscriber ready");
    }
}
