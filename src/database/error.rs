// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DbError {
    /// Transport or pool failure. Retryable.
    #[error("Database connection error: {0}")]
    Connection(String),

    /// Statement failed: bad SQL, constraint violation, schema mismatch.
    /// Not retryable without a data or mapping fix.
    #[error("Query error: {0}")]
    Query(String),

    /// Acquire or statement exceeded its deadline. Retryable.
    #[error("Database {operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Invalid database configuration: {0}")]
    Configuration(String),
}

impl DbError {
    /// Connection-class errors may succeed on a later attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout { .. })
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Query(_) => "query",
            Self::Timeout { .. } => "timeout",
            Self::Configuration(_) => "configuration",
        }
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => DbError::Connection(err.to_string()),
            sqlx::Error::Configuration(_) => DbError::Configuration(err.to_string()),
            other => DbError::Query(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(DbError::from(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(DbError::from(sqlx::Error::PoolClosed).is_retryable());
        assert!(DbError::from(sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused"
        )))
        .is_retryable());

        let not_found = DbError::from(sqlx::Error::RowNotFound);
        assert!(matches!(not_found, DbError::Query(_)));
        assert!(!not_found.is_retryable());
    }

    #[test]
    fn test_timeout_is_retryable() {
        let err = DbError::Timeout { operation: "query", after: Duration::from_secs(3) };
        assert!(err.is_retryable());
        assert_eq!(err.kind(), "timeout");
        assert!(err.to_string().contains("timed out"));
    }
}
