//! Error types for OakDB.

use thiserror::Error;

/// Result type alias using OakError.
pub type Result<T> = std::result::Result<T, OakError>;

/// Errors that can occur in OakDB operations.
///
/// Expected B+ tree outcomes (duplicate, underflow, overflow...) are not
/// errors; they travel as `OpResult` values. Everything here either comes
/// from the page store, from a caller mistake detected at the index API,
/// or from a broken structural invariant.
#[derive(Debug, Error)]
pub enum OakError {
    // Page store errors
    #[error("Page not found: {page_id}")]
    PageNotFound { page_id: u32 },

    #[error("Page {page_id} is pinned")]
    PagePinned { page_id: u32 },

    #[error("Page size mismatch: expected {expected}, got {actual}")]
    PageSizeMismatch { expected: usize, actual: usize },

    #[error("Invalid page size {size}: must be within {min}..={max}")]
    InvalidPageSize { size: usize, min: usize, max: usize },

    #[error("Page space exhausted")]
    OutOfPages,

    // B+ tree errors
    #[error("Key not found")]
    KeyNotFound,

    #[error("Key too large: {size} bytes (max {max})")]
    KeyTooLarge { size: usize, max: usize },

    #[error("Internal consistency violation: {0}")]
    InternalConsistency(String),

    // Caller errors
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter { name: String, value: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Object resolution
    #[error("Object not found: {0}")]
    ObjectNotFound(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_not_found_display() {
        let err = OakError::PageNotFound { page_id: 42 };
        assert_eq!(err.to_string(), "Page not found: 42");
    }

    #[test]
    fn test_page_pinned_display() {
        let err = OakError::PagePinned { page_id: 7 };
        assert_eq!(err.to_string(), "Page 7 is pinned");
    }

    #[test]
    fn test_invalid_page_size_display() {
        let err = OakError::InvalidPageSize {
            size: 16,
            min: 64,
            max: 65536,
        };
        assert_eq!(
            err.to_string(),
            "Invalid page size 16: must be within 64..=65536"
        );
    }

    #[test]
    fn test_tree_errors_display() {
        assert_eq!(OakError::KeyNotFound.to_string(), "Key not found");

        let err = OakError::KeyTooLarge {
            size: 9000,
            max: 8174,
        };
        assert_eq!(err.to_string(), "Key too large: 9000 bytes (max 8174)");

        let err = OakError::InternalConsistency("left != right".to_string());
        assert_eq!(
            err.to_string(),
            "Internal consistency violation: left != right"
        );
    }

    #[test]
    fn test_type_mismatch_display() {
        let err = OakError::TypeMismatch {
            expected: "Int".to_string(),
            actual: "String".to_string(),
        };
        assert_eq!(err.to_string(), "Type mismatch: expected Int, got String");
    }

    #[test]
    fn test_invalid_parameter_display() {
        let err = OakError::InvalidParameter {
            name: "object_id".to_string(),
            value: "0".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid parameter: object_id = 0");
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(OakError::OutOfPages)
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<OakError>();
    }
}
