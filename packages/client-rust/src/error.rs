use termvault_core::{CompileError, SchemaError};

/// Failures reported by the remote collection service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("request throttled, try again later")]
    Throttled,
    #[error("collection \"{name}\" not found")]
    CollectionNotFound { name: String },
    #[error("collection \"{name}\" already exists")]
    CollectionExists { name: String },
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl ServiceError {
    /// Whether the same request may succeed if sent again later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ServiceError::Unavailable(_) | ServiceError::Timeout { .. } | ServiceError::Throttled
        )
    }
}

/// Invalid argument to the bounded streaming buffer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    #[error("batch size must be at least 1")]
    ZeroBatchSize,
}

/// Errors from collection operations. Compile and service errors pass
/// through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollectionError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error("record must be a map with an optional string \"id\" field")]
    InvalidRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ServiceError::Unavailable("down".into()).is_transient());
        assert!(ServiceError::Timeout { timeout_ms: 10 }.is_transient());
        assert!(ServiceError::Throttled.is_transient());
        assert!(!ServiceError::Rejected("bad".into()).is_transient());
        assert!(!ServiceError::CollectionNotFound { name: "c".into() }.is_transient());
    }

    #[test]
    fn service_errors_pass_through_unchanged() {
        let err = CollectionError::from(ServiceError::Throttled);
        assert_eq!(err.to_string(), ServiceError::Throttled.to_string());
        assert_eq!(err, CollectionError::Service(ServiceError::Throttled));
    }
}
