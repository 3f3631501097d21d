// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Local → remote status translation.
//!
//! The table is many-to-one: transitional and failure states on the local
//! side are reported to the GRM as `pending` or `submitted`. Reverse lookup
//! therefore returns the canonical local status for a remote value, which is
//! the first local status declared for it.

use std::collections::HashMap;

/// Remote status used when the local status is absent or unknown.
pub const REMOTE_PENDING: &str = "pending";

/// Default table, canonical entries first.
const DEFAULT_STATUS_TABLE: &[(&str, &str)] = &[
    ("pending", "pending"),
    ("submitted", "submitted"),
    ("under_evaluation", "under_review"),
    ("escalated", "escalated"),
    ("resolved", "resolved"),
    ("denied", "rejected"),
    // transitional / system states
    ("draft", "pending"),
    ("temp", "pending"),
    ("submission_failed", "pending"),
    ("sync_failed", "pending"),
    ("queued", "submitted"),
    ("received", "submitted"),
];

#[derive(Debug, Clone)]
pub struct StatusMapping {
    forward: HashMap<String, String>,
    canonical: HashMap<String, String>,
}

impl StatusMapping {
    /// Build from `(local, remote)` pairs. For each remote value, the first
    /// pair that mentions it defines the canonical local status.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut forward = HashMap::new();
        let mut canonical = HashMap::new();
        for (local, remote) in pairs {
            forward.insert(local.to_string(), remote.to_string());
            canonical
                .entry(remote.to_string())
                .or_insert_with(|| local.to_string());
        }
        Self { forward, canonical }
    }

    /// Remote value for a local status. Unknown statuses collapse to
    /// [`REMOTE_PENDING`].
    pub fn to_remote(&self, local: &str) -> &str {
        match self.forward.get(local) {
            Some(remote) => remote,
            None => {
                tracing::warn!(status = local, "Unmapped local status, reporting as pending");
                REMOTE_PENDING
            }
        }
    }

    /// Canonical local status for a remote value. Unknown remote values pass
    /// through unchanged.
    pub fn to_local<'a>(&'a self, remote: &'a str) -> &'a str {
        self.canonical.get(remote).map(String::as_str).unwrap_or(remote)
    }

    /// Map a local status to the representative of its equivalence class.
    pub fn canonicalize<'a>(&'a self, local: &'a str) -> &'a str {
        let remote = self.to_remote(local);
        self.canonical.get(remote).map(String::as_str).unwrap_or(local)
    }

    pub fn contains(&self, local: &str) -> bool {
        self.forward.contains_key(local)
    }

    pub fn local_statuses(&self) -> impl Iterator<Item = &str> {
        self.forward.keys().map(String::as_str)
    }
}

impl Default for StatusMapping {
    fn default() -> Self {
        Self::from_pairs(DEFAULT_STATUS_TABLE.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_statuses_round_trip() {
        let mapping = StatusMapping::default();
        for local in ["pending", "submitted", "under_evaluation", "escalated", "resolved", "denied"] {
            let remote = mapping.to_remote(local);
            assert_eq!(mapping.to_local(remote), local);
        }
    }

    #[test]
    fn test_failure_variants_collapse_to_pending() {
        let mapping = StatusMapping::default();
        assert_eq!(mapping.to_remote("submission_failed"), "pending");
        assert_eq!(mapping.to_remote("sync_failed"), "pending");
        assert_eq!(mapping.to_local("pending"), "pending");
        assert_eq!(mapping.canonicalize("sync_failed"), "pending");
        assert_eq!(mapping.canonicalize("queued"), "submitted");
    }

    #[test]
    fn test_unknown_local_status_reports_pending() {
        let mapping = StatusMapping::default();
        assert_eq!(mapping.to_remote("something_new"), REMOTE_PENDING);
        assert!(!mapping.contains("something_new"));
    }

    #[test]
    fn test_unknown_remote_status_passes_through() {
        let mapping = StatusMapping::default();
        assert_eq!(mapping.to_local("archived"), "archived");
    }

    #[test]
    fn test_first_declared_pair_is_canonical() {
        let mapping = StatusMapping::from_pairs([("b_failed", "open"), ("a_open", "open")]);
        assert_eq!(mapping.to_local("open"), "b_failed");
    }

    #[test]
    fn test_resolved_maps_to_resolved() {
        let mapping = StatusMapping::default();
        assert_eq!(mapping.to_remote("resolved"), "resolved");
        assert_eq!(mapping.to_remote("denied"), "rejected");
    }
}
