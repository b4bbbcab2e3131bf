//! Error types for UID parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating identities.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The UID string is empty.
    #[error("UID cannot be empty")]
    Empty,

    /// The UID is not a valid UUID.
    #[error("invalid {kind} UID '{value}': {message}")]
    InvalidUuid {
        kind: &'static str,
        value: String,
        message: String,
    },
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }
}
