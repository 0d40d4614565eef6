//! Outbox error types.

use crate::InvocationError;
use thiserror::Error;
use txno_core::ValidationError;
use txno_database::DatabaseError;

/// Outbox error type.
#[derive(Error, Debug)]
pub enum OutboxError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Entry failed validation
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// An entry with the same unique request id already exists
    #[error("Request already scheduled: {0}")]
    AlreadyScheduled(String),

    /// Error raised by invoked work
    #[error("Invocation error: {0}")]
    Invocation(#[from] InvocationError),

    /// A handler is already registered for this target and method
    #[error("Handler already registered: {0}")]
    HandlerAlreadyRegistered(String),

    /// Scheduling requires an open transaction
    #[error("No active transaction")]
    NoTransaction,

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A delay would push an entry past any time the outbox accepts
    #[error("Delay too long: {0:?}")]
    DelayTooLong(std::time::Duration),

    /// The outbox is shutting down
    #[error("Outbox is shutting down")]
    ShuttingDown,

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OutboxError {
    /// Lift storage-level scheduling signals into their outbox equivalents.
    pub(crate) fn from_save(err: DatabaseError) -> Self {
        match err {
            DatabaseError::AlreadyScheduled(description) => OutboxError::AlreadyScheduled(description),
            DatabaseError::Validation(e) => OutboxError::Validation(e),
            other => OutboxError::Database(other),
        }
    }
}

/// Result type alias using OutboxError.
pub type OutboxResult<T> = Result<T, OutboxError>;
