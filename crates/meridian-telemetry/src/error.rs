//! Telemetry errors.

/// Errors from telemetry setup.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The global tracing subscriber was already installed.
    #[error("tracing subscriber already initialized")]
    AlreadyInitialized,
    /// The supplied filter directive string was malformed.
    #[error("invalid log filter directive: {0}")]
    InvalidFilter(String),
}

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
