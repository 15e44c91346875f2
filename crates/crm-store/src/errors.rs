//! Error types for the persistence layer.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// JSON serialization/deserialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which migration failed and why.
        message: String,
    },

    /// A stored row could not be mapped to a domain value.
    #[error("invalid row in {table}: {message}")]
    InvalidRow {
        /// Table the row came from.
        table: &'static str,
        /// What was wrong with it.
        message: String,
    },

    /// Requested conversation was not found (or is soft-deleted).
    #[error("conversation not found: {0}")]
    ConversationNotFound(String),

    /// Invalid operation on the store.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_error_display() {
        let err = StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows);
        assert!(err.to_string().contains("sqlite error"));
    }

    #[test]
    fn invalid_row_display() {
        let err = StoreError::InvalidRow {
            table: "im_conversations",
            message: "direct conversation without peer".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid row in im_conversations: direct conversation without peer"
        );
    }

    #[test]
    fn migration_error_display() {
        let err = StoreError::Migration {
            message: "v001 failed".into(),
        };
        assert_eq!(err.to_string(), "migration error: v001 failed");
    }

    #[test]
    fn sqlite_error_from_conversion() {
        let err: StoreError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, StoreError::Sqlite(_)));
    }
}
