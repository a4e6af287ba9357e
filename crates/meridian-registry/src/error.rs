//! Tool Registry errors.

/// Errors from registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Attempted to register a tool name that is already taken.
    #[error("tool name already registered: {0}")]
    DuplicateName(String),
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
