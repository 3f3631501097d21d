// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Property-based tests for field/status mapping and statistics.
//!
//! Run with: `cargo test --test proptest_mapping`

use proptest::prelude::*;
use serde_json::{Map, Value};

use grm_sync::mapping::REMOTE_PENDING;
use grm_sync::{FieldMapper, Record, SyncResult, SyncStatistics, SyncStatus};

// =============================================================================
// Strategies
// =============================================================================

const LOCAL_FIELDS: &[&str] = &[
    "id",
    "description",
    "location",
    "category",
    "language_code",
    "complainant_name",
    "complainant_phone",
    "complainant_email",
    "complainant_address",
];

const CANONICAL_STATUSES: &[&str] = &[
    "pending",
    "submitted",
    "under_evaluation",
    "escalated",
    "resolved",
    "denied",
];

const REMOTE_STATUSES: &[&str] = &[
    "pending",
    "submitted",
    "under_review",
    "escalated",
    "resolved",
    "rejected",
];

fn field_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        "[a-zA-Z0-9 .,'-]{0,40}".prop_map(Value::String),
        any::<i32>().prop_map(|n| Value::Number(n.into())),
        Just(Value::Null),
    ]
}

/// A local grievance using only mapped fields, with a canonical status.
fn local_record() -> impl Strategy<Value = Record> {
    (
        prop::collection::vec(field_value(), LOCAL_FIELDS.len()),
        prop::sample::select(CANONICAL_STATUSES),
        "20[0-9]{2}-0[1-9]-1[0-9] 0[0-9]:[0-5][0-9]:[0-5][0-9]",
    )
        .prop_map(|(values, status, created)| {
            let mut record = Map::new();
            for (field, value) in LOCAL_FIELDS.iter().zip(values) {
                record.insert(field.to_string(), value);
            }
            record.insert("status".into(), Value::String(status.to_string()));
            record.insert("created_at".into(), Value::String(created));
            record
        })
}

/// Arbitrary flat objects, including unmapped keys and odd status types.
fn arbitrary_record() -> impl Strategy<Value = Record> {
    let value = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        ".{0,20}".prop_map(Value::String),
    ];
    let key = prop_oneof![
        prop::sample::select(LOCAL_FIELDS).prop_map(String::from),
        Just("status".to_string()),
        Just("created_at".to_string()),
        "[a-z_]{1,12}",
    ];
    prop::collection::hash_map(key, value, 0..16).prop_map(|m| m.into_iter().collect())
}

fn status_sequence() -> impl Strategy<Value = Vec<SyncStatus>> {
    prop::collection::vec(
        prop::sample::select(vec![SyncStatus::Success, SyncStatus::Failed, SyncStatus::Retry]),
        0..50,
    )
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn prop_mapped_fields_survive_round_trip(record in local_record()) {
        let mapper = FieldMapper::default();
        let back = mapper.to_local(&mapper.to_remote(&record));
        prop_assert_eq!(back, record);
    }

    #[test]
    fn prop_remote_always_has_status_and_created(record in arbitrary_record()) {
        let mapper = FieldMapper::default();
        let remote = mapper.to_remote(&record);

        let status = remote.get("case_status").and_then(Value::as_str);
        prop_assert!(status.is_some());
        prop_assert!(REMOTE_STATUSES.contains(&status.unwrap_or(REMOTE_PENDING)));
        prop_assert!(remote.get("date_received").is_some_and(|v| !v.is_null()));

        // Nothing outside the field table crosses over
        let columns: Vec<&str> = mapper.fields().remote_columns().collect();
        for key in remote.keys() {
            prop_assert!(columns.contains(&key.as_str()), "unmapped column {}", key);
        }
    }

    #[test]
    fn prop_canonicalize_is_idempotent(status in prop_oneof![
        prop::sample::select(vec![
            "pending", "submitted", "under_evaluation", "escalated", "resolved",
            "denied", "draft", "temp", "submission_failed", "sync_failed",
            "queued", "received",
        ]).prop_map(String::from),
        "[a-z_]{1,16}",
    ]) {
        let statuses = FieldMapper::default().statuses().clone();
        let once = statuses.canonicalize(&status).to_string();
        prop_assert_eq!(statuses.canonicalize(&once), once.as_str());
        prop_assert_eq!(statuses.to_remote(&once), statuses.to_remote(&status));
    }

    #[test]
    fn prop_statistics_are_consistent(sequence in status_sequence()) {
        let history: Vec<SyncResult> = sequence
            .iter()
            .map(|status| match status {
                SyncStatus::Success => SyncResult::success("r", "ok", Value::Null),
                SyncStatus::Retry => SyncResult::retry_marker(Some("r".into()), 1, "retry", Value::Null),
                _ => SyncResult::failure("r", "failed", "boom"),
            })
            .collect();
        let stats = SyncStatistics::from_history(&history);

        prop_assert_eq!(stats.total, stats.succeeded + stats.failed);
        prop_assert_eq!(stats.total + stats.retries, history.len());
        prop_assert!((0.0..=100.0).contains(&stats.success_rate));
        if stats.total == 0 {
            prop_assert_eq!(stats.success_rate, 0.0);
            prop_assert!(stats.last_sync.is_none());
        }
    }
}
