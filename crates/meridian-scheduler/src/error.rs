//! Error types for the Autonomous Scheduler.

/// Errors raised by this crate.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The job's cron expression failed to parse.
    #[error("invalid cron expression \"{expr}\": {detail}")]
    InvalidCron {
        /// The offending expression.
        expr: String,
        /// Parser detail.
        detail: String,
    },
    /// The job's IANA timezone name failed to parse.
    #[error("invalid timezone \"{0}\"")]
    InvalidTimezone(String),
    /// The persistence layer failed.
    #[error("storage error: {0}")]
    Storage(String),
    /// Running the job's payload failed.
    #[error("job run failed: {0}")]
    RunFailed(String),
}

/// Convenience alias.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

impl From<meridian_storage::StorageError> for SchedulerError {
    fn from(err: meridian_storage::StorageError) -> Self {
        SchedulerError::Storage(err.to_string())
    }
}

impl From<meridian_runtime::RuntimeError> for SchedulerError {
    fn from(err: meridian_runtime::RuntimeError) -> Self {
        SchedulerError::RunFailed(err.to_string())
    }
}
