use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Single failed schema rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Domain-specific errors using thiserror
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Student not found: {id}")]
    StudentNotFound { id: Uuid },

    #[error("Student {id} is protected by an administrative account")]
    Protected { id: Uuid },

    #[error("Validation failed: {}", join_errors(.errors))]
    Validation { errors: Vec<FieldError> },

    #[error("Operation '{operation}' requires confirmation token '{expected}'")]
    ConfirmationRequired { operation: String, expected: String },

    #[error("Database error: {message}")]
    Database { message: String },
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl DomainError {
    pub fn student_not_found(id: Uuid) -> Self {
        Self::StudentNotFound { id }
    }

    pub fn protected(id: Uuid) -> Self {
        Self::Protected { id }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            errors: vec![FieldError::new(field, message)],
        }
    }

    pub fn invalid(errors: Vec<FieldError>) -> Self {
        Self::Validation { errors }
    }

    pub fn confirmation_required(operation: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::ConfirmationRequired {
            operation: operation.into(),
            expected: expected.into(),
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Per-item errors that batch operations skip instead of aborting on.
    pub fn is_item_error(&self) -> bool {
        matches!(self, Self::StudentNotFound { .. } | Self::Protected { .. })
    }
}
