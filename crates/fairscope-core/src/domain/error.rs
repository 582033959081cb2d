//! Domain-level error taxonomy for fairscope.

/// Fairscope domain errors.
#[derive(Debug, thiserror::Error)]
pub enum FairnessError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("external scorer error: {0}")]
    External(String),

    #[error("audit log error: {0}")]
    Audit(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FairnessError {
    /// Shorthand for a [`FairnessError::Configuration`].
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Shorthand for a [`FairnessError::InsufficientData`].
    pub fn insufficient(msg: impl Into<String>) -> Self {
        Self::InsufficientData(msg.into())
    }
}

/// Result type for fairscope domain operations.
pub type Result<T> = std::result::Result<T, FairnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fairness_error_display() {
        let err = FairnessError::config("attributes must not be empty");
        assert!(err.to_string().contains("configuration error"));

        let err = FairnessError::insufficient("sample_a has 1 value");
        assert!(err.to_string().contains("insufficient data"));

        let err = FairnessError::SchemaMismatch("all 10 records skipped".to_string());
        assert!(err.to_string().contains("schema mismatch"));
    }

    #[test]
    fn test_digest_mismatch_error() {
        let err = FairnessError::DigestMismatch {
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("def456"));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing cycle.json");
        let err: FairnessError = io.into();
        assert!(matches!(err, FairnessError::Io(_)));
        assert!(err.to_string().contains("missing cycle.json"));
    }
}
