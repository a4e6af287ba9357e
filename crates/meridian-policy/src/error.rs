//! Policy engine errors.

/// Errors from the access policy and inheritance engines.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// The policy store is unavailable; callers must fail closed (deny).
    #[error("policy store unavailable: {0}")]
    StoreUnavailable(String),

    /// A policy record failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A condition referenced a malformed value (bad CIDR, bad time format).
    #[error("malformed condition on policy {policy_id}: {detail}")]
    MalformedCondition {
        /// The offending policy's id.
        policy_id: String,
        /// What was wrong with it.
        detail: String,
    },

    /// Adding an edge to the inheritance DAG would create a cycle.
    #[error("inheritance edge would create a cycle at node {0}")]
    InheritanceCycle(String),
}

/// Result type for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

impl From<meridian_storage::StorageError> for PolicyError {
    fn from(err: meridian_storage::StorageError) -> Self {
        PolicyError::StoreUnavailable(err.to_string())
    }
}

impl From<PolicyError> for meridian_core::MeridianError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::StoreUnavailable(detail) => meridian_core::MeridianError::StoreUnavailable(detail),
            other => meridian_core::MeridianError::AccessDenied(other.to_string()),
        }
    }
}
