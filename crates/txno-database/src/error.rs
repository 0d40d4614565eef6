//! Database error types.

use thiserror::Error;
use txno_core::ValidationError;

/// Database error type.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// A uniqueness constraint rejected the write
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// An entry with the same unique request id already exists
    #[error("Request already scheduled: {0}")]
    AlreadyScheduled(String),

    /// The row was locked elsewhere and the lock wait ran out
    #[error("Lock wait timed out")]
    LockTimeout,

    /// Update or delete matched no row at the expected version
    #[error("Optimistic lock failed for {0}")]
    OptimisticLock(String),

    /// Transaction used after it finished
    #[error("Transaction is no longer active")]
    TransactionClosed,

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Entry failed validation before being written
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Invalid data error
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias using DatabaseError.
pub type DatabaseResult<T> = Result<T, DatabaseError>;
