// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Field and status mapping between the local grievance schema and the GRM.
//!
//! The field table is injective: every local field has exactly one remote
//! column and no two local fields share one. It is built once at startup and
//! read-only afterwards.
//!
//! # Example
//!
//! ```
//! use grm_sync::mapping::{FieldMapper, Record};
//! use serde_json::json;
//!
//! let mapper = FieldMapper::default();
//! let local: Record = json!({
//!     "id": "GR-1",
//!     "description": "dust complaint",
//!     "status": "submitted",
//! })
//! .as_object()
//! .cloned()
//! .unwrap();
//!
//! let remote = mapper.to_remote(&local);
//! assert_eq!(remote["grievance_id"], "GR-1");
//! assert_eq!(remote["grievance_details"], "dust complaint");
//! assert_eq!(remote["case_status"], "submitted");
//! assert!(remote.contains_key("date_received"));
//!
//! let back = mapper.to_local(&remote);
//! assert_eq!(back["description"], "dust complaint");
//! ```

mod status;

pub use status::{StatusMapping, REMOTE_PENDING};

use std::collections::HashSet;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;

use crate::config::is_identifier;

/// A flat grievance record, local or remote shape.
pub type Record = serde_json::Map<String, Value>;

pub const ID_FIELD: &str = "id";
pub const STATUS_FIELD: &str = "status";
pub const CREATED_FIELD: &str = "created_at";

/// Timestamp format written to the remote creation-date column.
pub const REMOTE_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const DEFAULT_FIELD_TABLE: &[(&str, &str)] = &[
    ("id", "grievance_id"),
    ("complainant_name", "complainant_full_name"),
    ("complainant_phone", "complainant_phone"),
    ("complainant_email", "complainant_email"),
    ("complainant_address", "complainant_address"),
    ("description", "grievance_details"),
    ("location", "grievance_location"),
    ("category", "grievance_category"),
    ("created_at", "date_received"),
    ("status", "case_status"),
    ("language_code", "language"),
];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MappingError {
    #[error("remote column '{remote}' is targeted by both '{first}' and '{second}'")]
    DuplicateTarget {
        remote: String,
        first: String,
        second: String,
    },

    #[error("local field '{0}' is mapped twice")]
    DuplicateSource(String),

    #[error("remote column '{0}' is not a valid identifier")]
    InvalidColumn(String),

    #[error("required local field '{0}' has no mapping")]
    MissingRequired(&'static str),
}

/// Ordered local-field → remote-column table.
#[derive(Debug, Clone)]
pub struct FieldMapping {
    entries: Vec<(String, String)>,
}

impl FieldMapping {
    /// Build and validate a mapping table.
    pub fn new<'a, I>(pairs: I) -> Result<Self, MappingError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut entries: Vec<(String, String)> = Vec::new();
        for (local, remote) in pairs {
            if !is_identifier(remote) {
                return Err(MappingError::InvalidColumn(remote.to_string()));
            }
            if entries.iter().any(|(l, _)| l == local) {
                return Err(MappingError::DuplicateSource(local.to_string()));
            }
            if let Some((first, _)) = entries.iter().find(|(_, r)| r == remote) {
                return Err(MappingError::DuplicateTarget {
                    remote: remote.to_string(),
                    first: first.clone(),
                    second: local.to_string(),
                });
            }
            entries.push((local.to_string(), remote.to_string()));
        }
        for required in [ID_FIELD, STATUS_FIELD] {
            if !entries.iter().any(|(l, _)| l == required) {
                return Err(MappingError::MissingRequired(required));
            }
        }
        Ok(Self { entries })
    }

    pub fn remote_for(&self, local: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(l, _)| l == local)
            .map(|(_, r)| r.as_str())
    }

    pub fn local_for(&self, remote: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, r)| r == remote)
            .map(|(l, _)| l.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(l, r)| (l.as_str(), r.as_str()))
    }

    pub fn remote_columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, r)| r.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when no two local fields share a remote column.
    pub fn is_injective(&self) -> bool {
        let mut seen = HashSet::new();
        self.entries.iter().all(|(_, r)| seen.insert(r.as_str()))
    }
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            entries: DEFAULT_FIELD_TABLE
                .iter()
                .map(|(l, r)| (l.to_string(), r.to_string()))
                .collect(),
        }
    }
}

/// Translates records between the local and remote schemas.
#[derive(Debug, Clone, Default)]
pub struct FieldMapper {
    fields: FieldMapping,
    statuses: StatusMapping,
}

impl FieldMapper {
    pub fn new(fields: FieldMapping, statuses: StatusMapping) -> Self {
        Self { fields, statuses }
    }

    pub fn fields(&self) -> &FieldMapping {
        &self.fields
    }

    pub fn statuses(&self) -> &StatusMapping {
        &self.statuses
    }

    /// Remote column holding the record identifier.
    pub fn id_column(&self) -> &str {
        self.fields.remote_for(ID_FIELD).unwrap_or(ID_FIELD)
    }

    /// Remote column holding the case status.
    pub fn status_column(&self) -> &str {
        self.fields.remote_for(STATUS_FIELD).unwrap_or(STATUS_FIELD)
    }

    /// Remote creation-date column, if mapped.
    pub fn created_column(&self) -> Option<&str> {
        self.fields.remote_for(CREATED_FIELD)
    }

    /// Stable identifier of a local record, if it has a usable one.
    pub fn record_id(&self, local: &Record) -> Option<String> {
        match local.get(ID_FIELD)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Local → remote. Fields absent from the input are omitted; status and
    /// the creation date always get a value.
    ///
    /// A record without `created_at` is stamped with the current time, and
    /// the upsert writes that over the stored creation date. Re-syncs of an
    /// existing grievance should carry its original `created_at`.
    pub fn to_remote(&self, local: &Record) -> Record {
        let mut remote = Record::new();
        for (local_key, remote_key) in self.fields.iter() {
            match local_key {
                STATUS_FIELD => {
                    let status = match local.get(STATUS_FIELD) {
                        Some(Value::String(s)) => self.statuses.to_remote(s),
                        _ => REMOTE_PENDING,
                    };
                    remote.insert(remote_key.to_string(), Value::String(status.to_string()));
                }
                CREATED_FIELD => {
                    let created = match local.get(CREATED_FIELD) {
                        Some(v) if !v.is_null() => v.clone(),
                        _ => Value::String(Utc::now().format(REMOTE_DATETIME_FORMAT).to_string()),
                    };
                    remote.insert(remote_key.to_string(), created);
                }
                _ => {
                    if let Some(value) = local.get(local_key) {
                        remote.insert(remote_key.to_string(), value.clone());
                    }
                }
            }
        }
        remote
    }

    /// Remote → local, the structural mirror of [`to_remote`](Self::to_remote).
    /// Status comes back as the canonical local representative.
    pub fn to_local(&self, remote: &Record) -> Record {
        let mut local = Record::new();
        for (local_key, remote_key) in self.fields.iter() {
            let Some(value) = remote.get(remote_key) else {
                continue;
            };
            let value = match (local_key, value) {
                (STATUS_FIELD, Value::String(s)) => {
                    Value::String(self.statuses.to_local(s).to_string())
                }
                _ => value.clone(),
            };
            local.insert(local_key.to_string(), value);
        }
        local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_default_mapping_is_injective() {
        let mapping = FieldMapping::default();
        assert!(mapping.is_injective());
        // Re-validating the default table through the checked constructor
        let pairs: Vec<(String, String)> = mapping
            .iter()
            .map(|(l, r)| (l.to_string(), r.to_string()))
            .collect();
        assert!(FieldMapping::new(pairs.iter().map(|(l, r)| (l.as_str(), r.as_str()))).is_ok());
    }

    #[test]
    fn test_duplicate_target_rejected() {
        let err = FieldMapping::new([
            ("id", "grievance_id"),
            ("status", "case_status"),
            ("phone", "contact"),
            ("email", "contact"),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            MappingError::DuplicateTarget {
                remote: "contact".into(),
                first: "phone".into(),
                second: "email".into(),
            }
        );
    }

    #[test]
    fn test_missing_required_field_rejected() {
        let err = FieldMapping::new([("id", "grievance_id")]).unwrap_err();
        assert_eq!(err, MappingError::MissingRequired("status"));
    }

    #[test]
    fn test_invalid_column_rejected() {
        let err = FieldMapping::new([("id", "grievance id")]).unwrap_err();
        assert!(matches!(err, MappingError::InvalidColumn(_)));
    }

    #[test]
    fn test_missing_fields_are_omitted_not_nulled() {
        let mapper = FieldMapper::default();
        let remote = mapper.to_remote(&record(json!({"id": "GR-9"})));
        assert!(!remote.contains_key("complainant_full_name"));
        assert!(!remote.contains_key("grievance_details"));
        assert_eq!(remote["grievance_id"], "GR-9");
    }

    #[test]
    fn test_status_defaults_to_pending() {
        let mapper = FieldMapper::default();
        let remote = mapper.to_remote(&record(json!({"id": "GR-9"})));
        assert_eq!(remote["case_status"], REMOTE_PENDING);

        let remote = mapper.to_remote(&record(json!({"id": "GR-9", "status": null})));
        assert_eq!(remote["case_status"], REMOTE_PENDING);
    }

    #[test]
    fn test_creation_date_always_present() {
        let mapper = FieldMapper::default();
        let remote = mapper.to_remote(&record(json!({"id": "GR-9"})));
        let date = remote["date_received"].as_str().unwrap();
        assert!(chrono::NaiveDateTime::parse_from_str(date, REMOTE_DATETIME_FORMAT).is_ok());

        let remote = mapper.to_remote(&record(json!({
            "id": "GR-9",
            "created_at": "2024-03-01 10:00:00"
        })));
        assert_eq!(remote["date_received"], "2024-03-01 10:00:00");
    }

    #[test]
    fn test_unmapped_extras_ignored() {
        let mapper = FieldMapper::default();
        let remote = mapper.to_remote(&record(json!({
            "id": "GR-9",
            "otp_code": "123456",
            "chat_session": {"turns": 4}
        })));
        assert!(!remote.contains_key("otp_code"));
        assert!(!remote.contains_key("chat_session"));
    }

    #[test]
    fn test_round_trip_restores_mapped_fields() {
        let mapper = FieldMapper::default();
        let local = record(json!({
            "id": "GR-1",
            "complainant_name": "Asha",
            "complainant_phone": "+977-1-5550000",
            "description": "dust complaint",
            "location": "Ward 4",
            "category": "environment",
            "created_at": "2024-03-01 10:00:00",
            "status": "under_evaluation",
            "language_code": "ne"
        }));
        let back = mapper.to_local(&mapper.to_remote(&local));
        assert_eq!(back, local);
    }

    #[test]
    fn test_round_trip_canonicalizes_collapsed_status() {
        let mapper = FieldMapper::default();
        let local = record(json!({"id": "GR-1", "status": "submission_failed"}));
        let back = mapper.to_local(&mapper.to_remote(&local));
        assert_eq!(back["status"], "pending");
    }

    #[test]
    fn test_record_id_extraction() {
        let mapper = FieldMapper::default();
        assert_eq!(mapper.record_id(&record(json!({"id": "GR-1"}))), Some("GR-1".into()));
        assert_eq!(mapper.record_id(&record(json!({"id": 42}))), Some("42".into()));
        assert_eq!(mapper.record_id(&record(json!({"id": "  "}))), None);
        assert_eq!(mapper.record_id(&record(json!({"id": null}))), None);
        assert_eq!(mapper.record_id(&record(json!({}))), None);
    }

    #[test]
    fn test_key_columns() {
        let mapper = FieldMapper::default();
        assert_eq!(mapper.id_column(), "grievance_id");
        assert_eq!(mapper.status_column(), "case_status");
    }
}
