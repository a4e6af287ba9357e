//! Audit log errors.

/// Errors from audit log operations.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// The underlying storage backend failed.
    #[error("audit storage error: {0}")]
    Storage(#[from] meridian_storage::StorageError),
    /// An entry failed to serialize.
    #[error("failed to serialize audit entry: {0}")]
    Serialization(String),
}

/// Result type for audit log operations.
pub type AuditResult<T> = Result<T, AuditError>;
