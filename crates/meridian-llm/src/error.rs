//! LLM Port errors (spec §4.Y).

/// The small, provider-agnostic error taxonomy every [`crate::LlmProvider`]
/// must normalize into.
#[derive(Debug, thiserror::Error, Clone)]
pub enum LlmError {
    /// Transient network/provider failure; the runtime retries once with
    /// a different credential.
    #[error("transient provider error: {0}")]
    Transient(String),
    /// The credential was rejected outright; it is evicted permanently.
    #[error("credential rejected: {0}")]
    AuthInvalid(String),
    /// The request exceeded the model's context window.
    #[error("context limit exceeded: {0}")]
    ContextLimit(String),
    /// The provider is down or not configured for this request.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// The provider refused the content (safety filter).
    #[error("content filtered: {0}")]
    ContentFiltered(String),
}

/// Result type for LLM Port operations.
pub type LlmResult<T> = Result<T, LlmError>;

impl From<LlmError> for meridian_core::MeridianError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::ProviderUnavailable(detail) | LlmError::Transient(detail) => {
                meridian_core::MeridianError::ProviderUnavailable(detail)
            }
            LlmError::AuthInvalid(detail) => meridian_core::MeridianError::ProviderUnavailable(detail),
            LlmError::ContextLimit(detail) | LlmError::ContentFiltered(detail) => {
                meridian_core::MeridianError::InvalidRequest(detail)
            }
        }
    }
}
