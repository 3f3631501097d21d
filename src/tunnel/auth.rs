// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Tunnel credential selection.
//!
//! Precedence: a configured key file that exists on disk, then a configured
//! password. Nothing usable is [`TunnelError::AuthenticationUnavailable`].

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::TunnelError;
use crate::config::TunnelConfig;

#[derive(Clone, PartialEq, Eq)]
pub enum TunnelAuth {
    KeyFile {
        path: PathBuf,
        passphrase: Option<String>,
    },
    Password(String),
}

impl TunnelAuth {
    pub fn method(&self) -> &'static str {
        match self {
            Self::KeyFile { .. } => "publickey",
            Self::Password(_) => "password",
        }
    }
}

impl std::fmt::Debug for TunnelAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeyFile { path, passphrase } => f
                .debug_struct("KeyFile")
                .field("path", path)
                .field("passphrase", &passphrase.as_ref().map(|_| "***"))
                .finish(),
            Self::Password(_) => f.debug_tuple("Password").field(&"***").finish(),
        }
    }
}

/// Pick the credential to use for `config`.
pub fn resolve(config: &TunnelConfig) -> Result<TunnelAuth, TunnelError> {
    if let Some(path) = config.ssh_key_path.as_deref().filter(|p| !p.is_empty()) {
        let path = expand_home(path);
        if path.is_file() {
            debug!(path = %path.display(), "Using SSH key authentication");
            return Ok(TunnelAuth::KeyFile {
                path,
                passphrase: config.ssh_key_passphrase.clone(),
            });
        }
        warn!(path = %path.display(), "SSH key file not found, trying password authentication");
    }

    match config.ssh_password.as_deref() {
        Some(pw) if !pw.is_empty() => {
            debug!("Using SSH password authentication");
            Ok(TunnelAuth::Password(pw.to_string()))
        }
        _ => Err(TunnelError::AuthenticationUnavailable),
    }
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => Path::new(&home).join(rest),
        _ => PathBuf::from(path),
    }
}
