//! Datastore error model.

use thiserror::Error;

use orderdesk_core::DomainError;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failure of a datastore operation.
///
/// Domain failures raised inside a transaction pass through unchanged so
/// callers can still match on `InsufficientStock`, `NotFound`, and friends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("datastore lock poisoned")]
    LockPoisoned,

    #[error("write attempted in a read-only session")]
    ReadOnly,

    #[error("database error in {operation}: {message}")]
    Database {
        operation: &'static str,
        message: String,
    },
}

impl StoreError {
    pub fn database(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Database {
            operation,
            message: message.into(),
        }
    }

    /// The domain error, if this failure came from the model.
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            StoreError::Domain(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Domain(DomainError::Conflict(_)))
    }
}
