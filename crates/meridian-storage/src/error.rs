//! Storage error types.

/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested key or record was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A filesystem operation failed.
    #[error("io error at {path}: {source}")]
    Io {
        /// Path the failing operation targeted.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A stored record failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The namespace or key is invalid (e.g. contains path separators).
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// An append violated the gap-free monotonic `seq` invariant.
    #[error("non-monotonic sequence for session {session_id}: expected {expected}, got {actual}")]
    NonMonotonicSeq {
        /// The session whose log would have torn.
        session_id: String,
        /// The `seq` that should have been appended next.
        expected: u64,
        /// The `seq` that was actually supplied.
        actual: u64,
    },
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for meridian_core::MeridianError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => meridian_core::MeridianError::SessionNotFound(id),
            other => meridian_core::MeridianError::StoreUnavailable(other.to_string()),
        }
    }
}
