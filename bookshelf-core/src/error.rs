//! Core error types.

use thiserror::Error;

/// Errors raised while mapping a book between representations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("field '{field}' has unexpected type: expected string")]
    InvalidFieldType { field: &'static str },
}

impl CoreError {
    /// Returns the name of the offending field.
    pub fn field(&self) -> &'static str {
        match self {
            CoreError::MissingField { field } => field,
            CoreError::InvalidFieldType { field } => field,
        }
    }
}
