//! Error types for workspace boundary checks and bootstrap assembly.

/// Errors raised by this crate.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    /// A bootstrap file could not be read from disk.
    #[error("failed to read bootstrap file {path}: {detail}")]
    BootstrapFileUnreadable {
        /// The path that failed to read.
        path: String,
        /// The underlying I/O error, as text.
        detail: String,
    },
    /// An escape request path could not be canonicalized.
    #[error("failed to resolve path {path}: {detail}")]
    PathResolution {
        /// The path that failed to resolve.
        path: String,
        /// The underlying I/O error, as text.
        detail: String,
    },
}

/// Convenience alias.
pub type WorkspaceResult<T> = Result<T, WorkspaceError>;

impl From<WorkspaceError> for meridian_core::MeridianError {
    fn from(err: WorkspaceError) -> Self {
        meridian_core::MeridianError::Internal(err.to_string())
    }
}
