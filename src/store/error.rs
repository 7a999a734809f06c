//! Store Errors
//!
//! Error types for storage operations.

use crate::domain::DomainError;

/// Errors that can occur in a store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Unique constraint on the email column
    #[error("Email already registered: {0}")]
    DuplicateEmail(String),

    /// A guard evaluated under the write lock refused the write
    #[error("Write rejected: {0}")]
    Rejected(DomainError),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// In-memory latch poisoned by a panicking writer
    #[error("Store lock poisoned")]
    Poisoned,

    /// Row that cannot be mapped back into a domain value
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Database(_))
    }
}

impl From<DomainError> for StoreError {
    fn from(err: DomainError) -> Self {
        StoreError::Rejected(err)
    }
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail(email) => DomainError::DuplicateEmail(email),
            StoreError::Rejected(rejection) => rejection,
            other => DomainError::Storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EventId;

    #[test]
    fn test_rejection_passes_through() {
        let rejection = DomainError::PastEvent(EventId(1));
        let err: DomainError = StoreError::Rejected(rejection.clone()).into();
        assert_eq!(err, rejection);
    }

    #[test]
    fn test_duplicate_email_maps_to_domain() {
        let err: DomainError = StoreError::DuplicateEmail("a@b.c".to_string()).into();
        assert_eq!(err, DomainError::DuplicateEmail("a@b.c".to_string()));
    }

    #[test]
    fn test_infrastructure_errors_become_storage() {
        let err: DomainError = StoreError::Poisoned.into();
        assert!(matches!(err, DomainError::Storage(_)));
        assert!(err.is_retryable());
    }
}
