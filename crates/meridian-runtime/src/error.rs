//! Error types for the Session Manager, Agent Runtime loop, and Sandbox
//! Driver.

use meridian_core::MeridianError;

/// Errors raised by this crate.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The session id or key did not resolve.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// A subagent spawn would exceed the maximum nesting depth.
    #[error("subagent depth exceeded (max {max}): attempted {attempted}")]
    DepthExceeded {
        /// The configured maximum.
        max: u8,
        /// The depth that was attempted.
        attempted: u8,
    },

    /// The persistence layer failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// The LLM provider failed in a way the loop could not recover from.
    #[error("LLM error: {0}")]
    Llm(String),

    /// No credential was available for the requested provider.
    #[error("no credential available: {0}")]
    NoCredential(String),

    /// A tenant's quota or rate limit was exhausted.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The tool invocation was refused by the Access Policy Engine.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The Sandbox Driver is required but unavailable.
    #[error("sandbox driver unavailable")]
    SandboxUnavailable,

    /// A sandboxed tool invocation exceeded its wall-clock timeout.
    #[error("tool invocation timed out after {0}ms")]
    ToolTimeout(u64),

    /// A tool handler is not registered for the requested name.
    #[error("no handler registered for tool {0}")]
    UnknownTool(String),

    /// A tool handler returned an error.
    #[error("tool {tool} failed: {detail}")]
    ToolFailed {
        /// The failing tool's name.
        tool: String,
        /// The handler's error detail.
        detail: String,
    },

    /// The agent loop reached its configured iteration cap without a final
    /// assistant message.
    #[error("agent loop reached the iteration limit ({0})")]
    IterationLimit(u32),

    /// The turn's deadline elapsed.
    #[error("turn deadline elapsed after {0}ms")]
    Timeout(u64),
}

/// Convenience alias.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

impl From<meridian_storage::StorageError> for RuntimeError {
    fn from(err: meridian_storage::StorageError) -> Self {
        match err {
            meridian_storage::StorageError::NotFound(id) => RuntimeError::SessionNotFound(id),
            other => RuntimeError::Storage(other.to_string()),
        }
    }
}

impl From<meridian_llm::LlmError> for RuntimeError {
    fn from(err: meridian_llm::LlmError) -> Self {
        RuntimeError::Llm(err.to_string())
    }
}

impl From<meridian_quota::QuotaError> for RuntimeError {
    fn from(err: meridian_quota::QuotaError) -> Self {
        RuntimeError::QuotaExceeded(err.to_string())
    }
}

impl From<RuntimeError> for MeridianError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::SessionNotFound(id) => MeridianError::SessionNotFound(id),
            RuntimeError::DepthExceeded { attempted, .. } => MeridianError::DepthExceeded(attempted),
            RuntimeError::Storage(detail) => MeridianError::StoreUnavailable(detail),
            RuntimeError::Llm(detail) | RuntimeError::NoCredential(detail) => MeridianError::ProviderUnavailable(detail),
            RuntimeError::QuotaExceeded(detail) => MeridianError::QuotaExceeded {
                kind: detail,
                tenant: String::new(),
            },
            RuntimeError::AccessDenied(detail) => MeridianError::AccessDenied(detail),
            RuntimeError::SandboxUnavailable => MeridianError::ProviderUnavailable("sandbox driver unavailable".into()),
            RuntimeError::ToolTimeout(ms) | RuntimeError::Timeout(ms) => MeridianError::Timeout(ms),
            RuntimeError::UnknownTool(name) => MeridianError::InvalidRequest(format!("unknown tool {name}")),
            RuntimeError::ToolFailed { tool, detail } => MeridianError::Internal(format!("tool {tool} failed: {detail}")),
            RuntimeError::IterationLimit(limit) => MeridianError::Internal(format!("iteration limit {limit} reached")),
        }
    }
}
