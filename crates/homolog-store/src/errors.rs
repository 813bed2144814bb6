//! Error types for the store.
//!
//! [`StoreError`] is the single error type returned by all store operations.
//! Variants split into three tiers the caller treats differently:
//!
//! - **Fatal at startup**: [`StoreError::PermissionDenied`],
//!   [`StoreError::LockHeld`], [`StoreError::Migration`] — the process must
//!   not serve reads or writes against this file.
//! - **Expected and recoverable**: [`StoreError::NotFound`],
//!   [`StoreError::Validation`], [`StoreError::Conflict`] — surfaced to the
//!   UI as actionable messages.
//! - **Transient**: [`StoreError::Unavailable`] — safe to retry with
//!   backoff above the store's own busy timeout.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database directory or lock file is not writable.
    #[error("no write permission: {0}")]
    PermissionDenied(String),

    /// Another live process instance holds the write lock.
    #[error("database is in use by another instance (pid {pid})")]
    LockHeld {
        /// Process id recorded by the lock holder.
        pid: u32,
    },

    /// Schema migration failed; the file must not be served.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which migration failed and why.
        message: String,
    },

    /// Requested row is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller-level constraint violated (missing required field, no-op
    /// update, unknown enum value from the caller).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unique-constraint or foreign-key violation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Busy timeout exceeded or the file is temporarily inaccessible.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A persisted row failed to map back into its domain type.
    #[error("corrupt row in {table}.{column}: {detail}")]
    CorruptRow {
        /// Table the row came from.
        table: &'static str,
        /// Column that failed to decode.
        column: &'static str,
        /// Decoder error detail.
        detail: String,
    },

    /// Underlying SQLite error not classified above.
    #[error("sqlite error: {0}")]
    Sqlite(rusqlite::Error),

    /// JSON serialization error (audit images, lock record).
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Filesystem error outside the database engine.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;
        match &e {
            rusqlite::Error::SqliteFailure(inner, _) => match inner.code {
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                    Self::Unavailable(e.to_string())
                }
                ErrorCode::ConstraintViolation => Self::Conflict(e.to_string()),
                _ => Self::Sqlite(e),
            },
            _ => Self::Sqlite(e),
        }
    }
}

impl StoreError {
    /// True for errors safe to retry after a backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// True for errors that must abort startup for this file.
    pub fn is_fatal_startup(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied(_) | Self::LockHeld { .. } | Self::Migration { .. }
        )
    }
}

/// Convenience alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
