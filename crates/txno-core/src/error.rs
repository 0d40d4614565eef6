//! Validation error types.

use thiserror::Error;

/// Raised when an entry is malformed. Always detected before any I/O.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field was empty
    #[error("{field} is required")]
    Missing { field: &'static str },

    /// An optional field was present but blank
    #[error("{field} may not be blank")]
    Blank { field: &'static str },

    /// A counter was negative
    #[error("{field} must be zero or positive, got {value}")]
    Negative { field: &'static str, value: i64 },

    /// The topic collided with the reserved "no topic" marker
    #[error("topic may not be '{0}'")]
    ReservedTopic(&'static str),
}

/// Result type alias using ValidationError.
pub type ValidationResult<T> = Result<T, ValidationError>;
