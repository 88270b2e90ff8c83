use thiserror::Error;
use uuid::Uuid;

/// Errors that are safe to expose to other modules
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StudentRecordsError {
    #[error("Student not found: {id}")]
    NotFound { id: Uuid },

    #[error("Student {id} is linked to an administrative account")]
    Protected { id: Uuid },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Confirmation required for '{operation}': expected token '{expected}'")]
    ConfirmationRequired {
        operation: String,
        expected: String,
    },

    #[error("Internal error")]
    Internal,
}

impl StudentRecordsError {
    pub fn not_found(id: Uuid) -> Self {
        Self::NotFound { id }
    }

    pub fn protected(id: Uuid) -> Self {
        Self::Protected { id }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn confirmation_required(operation: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::ConfirmationRequired {
            operation: operation.into(),
            expected: expected.into(),
        }
    }

    pub fn internal() -> Self {
        Self::Internal
    }
}

impl From<crate::domain::error::DomainError> for StudentRecordsError {
    fn from(domain_error: crate::domain::error::DomainError) -> Self {
        use crate::domain::error::DomainError::*;
        match domain_error {
            StudentNotFound { id } => Self::not_found(id),
            Protected { id } => Self::protected(id),
            Validation { errors } => Self::validation(
                errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            ),
            ConfirmationRequired {
                operation,
                expected,
            } => Self::confirmation_required(operation, expected),
            Database { .. } => Self::internal(),
        }
    }
}
