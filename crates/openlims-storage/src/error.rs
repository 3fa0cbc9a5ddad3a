//! Storage error types for the persistence abstraction layer.

use std::fmt;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested record was not found.
    #[error("{entity} not found: {key}")]
    NotFound {
        /// The kind of record that was not found.
        entity: String,
        /// The ID or natural key that was looked up.
        key: String,
    },

    /// A uniqueness constraint was violated.
    #[error("{entity} already exists: {key}")]
    AlreadyExists {
        /// The kind of record that collided.
        entity: String,
        /// The conflicting ID or natural key.
        key: String,
    },

    /// The operation violates a domain rule (bad enum value, illegal status
    /// transition, referential breakage).
    #[error("Validation failed: {message}")]
    Validation {
        /// Description of the violated rule.
        message: String,
    },

    /// Removing these tests from the sample would discard recorded results.
    /// The caller must retry with `force` to proceed.
    #[error("Removing tests from sample {sample_id} would discard recorded results: {test_ids:?}")]
    WouldDiscardResults {
        sample_id: String,
        test_ids: Vec<String>,
    },

    /// An internal storage error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(entity: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            key: key.into(),
        }
    }

    /// Creates a new `AlreadyExists` error.
    #[must_use]
    pub fn already_exists(entity: impl Into<String>, key: impl Into<String>) -> Self {
        Self::AlreadyExists {
            entity: entity.into(),
            key: key.into(),
        }
    }

    /// Creates a new `Validation` error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a new `WouldDiscardResults` error.
    #[must_use]
    pub fn would_discard_results(sample_id: impl Into<String>, test_ids: Vec<String>) -> Self {
        Self::WouldDiscardResults {
            sample_id: sample_id.into(),
            test_ids,
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is an already exists error.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::AlreadyExists { .. } => ErrorCategory::Conflict,
            Self::Validation { .. } => ErrorCategory::Validation,
            Self::WouldDiscardResults { .. } => ErrorCategory::Conflict,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of storage errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Record not found.
    NotFound,
    /// Uniqueness or guarded-removal conflict.
    Conflict,
    /// Domain rule violation.
    Validation,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Validation => write!(f, "validation"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::not_found("Patient", "123");
        assert_eq!(err.to_string(), "Patient not found: 123");

        let err = StorageError::already_exists("Sample", "ACC001");
        assert_eq!(err.to_string(), "Sample already exists: ACC001");
    }

    #[test]
    fn test_error_predicates() {
        let err = StorageError::not_found("Patient", "123");
        assert!(err.is_not_found());
        assert!(!err.is_already_exists());

        let err = StorageError::already_exists("Test", "CBC");
        assert!(err.is_already_exists());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            StorageError::not_found("Patient", "123").category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            StorageError::already_exists("Sample", "ACC001").category(),
            ErrorCategory::Conflict
        );
        assert_eq!(
            StorageError::would_discard_results("s1", vec!["t1".into()]).category(),
            ErrorCategory::Conflict
        );
        assert_eq!(
            StorageError::validation("bad data").category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            StorageError::internal("boom").category(),
            ErrorCategory::Internal
        );
    }

    #[test]
    fn test_would_discard_results_message_names_tests() {
        let err = StorageError::would_discard_results("s1", vec!["t1".into(), "t2".into()]);
        let msg = err.to_string();
        assert!(msg.contains("s1"));
        assert!(msg.contains("t1"));
        assert!(msg.contains("t2"));
    }
}
