//! Domain-level error taxonomy shared by artifact and digest handling.

/// Errors produced when constructing domain values from raw input.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} is {len} characters, limit is {max}")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("{field} value {value} is outside [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// Idea Unpacker domain errors.
#[derive(Debug, thiserror::Error)]
pub enum UnpackerError {
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("non-canonical value: {0}")]
    NonCanonical(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, UnpackerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::TooLong {
            field: "topic",
            len: 60,
            max: 50,
        };
        assert_eq!(err.to_string(), "topic is 60 characters, limit is 50");

        let err = UnpackerError::from(ValidationError::Empty { field: "intent" });
        assert!(err.to_string().contains("intent must not be empty"));
    }

    #[test]
    fn test_out_of_range_compares_by_value() {
        let err = ValidationError::OutOfRange {
            field: "score",
            value: 120.0,
            min: 0.0,
            max: 100.0,
        };
        assert_eq!(err.clone(), err);
        assert_ne!(
            err,
            ValidationError::OutOfRange {
                field: "score",
                value: 101.0,
                min: 0.0,
                max: 100.0,
            }
        );
        assert_eq!(err.to_string(), "score value 120 is outside [0, 100]");
    }

    #[test]
    fn test_digest_mismatch_error() {
        let err = UnpackerError::DigestMismatch {
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("def456"));
    }
}
