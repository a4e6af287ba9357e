//! Error taxonomy (spec §7) and the bit-exact Gateway wire error codes
//! (spec §6) every variant maps to.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised anywhere in the Meridian gateway's core components.
///
/// Every variant has a fixed mapping to a [`WireErrorCode`] via
/// [`MeridianError::wire_code`], so the Gateway can turn any internal error
/// into a coded `response` without leaking implementation detail.
#[derive(Debug, Error)]
pub enum MeridianError {
    /// Session id or key did not resolve to an existing session.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Subagent depth would exceed the maximum of 3.
    #[error("subagent depth exceeded (max 3): attempted {0}")]
    DepthExceeded(u8),

    /// Two callers raced to create the same session; the loser observes this.
    #[error("session creation conflict for key {0}")]
    Conflict(String),

    /// The persistence backend is unavailable (I/O failure, not found).
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Tenant id did not resolve to an existing tenant.
    #[error("tenant not found: {0}")]
    TenantNotFound(String),

    /// A quota limit, rate limit, or concurrency slot was exhausted.
    #[error("quota exceeded: {kind} for tenant {tenant}")]
    QuotaExceeded {
        /// The quota kind that was exceeded.
        kind: String,
        /// The tenant that hit the limit.
        tenant: String,
    },

    /// Access Policy Engine denied the action.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The request was malformed or referenced an unknown field/method.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No handler is registered for the requested method.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// A deadline elapsed before the operation completed.
    #[error("operation timed out after {0}ms")]
    Timeout(u64),

    /// The Gateway or a connection could not be linked to an authenticated
    /// principal.
    #[error("connection not linked")]
    NotLinked,

    /// The Gateway connection requested an operation before pairing/handshake
    /// completed.
    #[error("connection not paired")]
    NotPaired,

    /// The LLM provider, Storage Port, or Sandbox Driver is transiently
    /// unavailable.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// A non-recoverable invariant violation (e.g. non-monotonic `seq`).
    #[error("fatal invariant violation: {0}")]
    Fatal(String),

    /// Catch-all for unexpected internal failures.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias.
pub type MeridianResult<T> = Result<T, MeridianError>;

/// The fixed set of Gateway wire error codes (spec §6), preserved bit-exact
/// for client compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WireErrorCode {
    /// Connection has not completed the auth handshake.
    NotLinked,
    /// Connection has not completed protocol negotiation.
    NotPaired,
    /// Agent Runtime deadline elapsed.
    AgentTimeout,
    /// Malformed request / missing field / unknown method parameter.
    InvalidRequest,
    /// Server is shedding load or otherwise temporarily unavailable.
    Unavailable,
    /// No handler registered for the given method name.
    MethodNotFound,
    /// Unexpected internal failure.
    InternalError,
    /// A tenant quota or rate limit was exceeded.
    QuotaExceeded,
    /// Access Policy Engine denied the action.
    AccessDenied,
}

impl MeridianError {
    /// Map this error to its fixed wire code.
    #[must_use]
    pub fn wire_code(&self) -> WireErrorCode {
        match self {
            MeridianError::NotLinked => WireErrorCode::NotLinked,
            MeridianError::NotPaired => WireErrorCode::NotPaired,
            MeridianError::Timeout(_) => WireErrorCode::AgentTimeout,
            MeridianError::InvalidRequest(_) => WireErrorCode::InvalidRequest,
            MeridianError::MethodNotFound(_) => WireErrorCode::MethodNotFound,
            MeridianError::QuotaExceeded { .. } => WireErrorCode::QuotaExceeded,
            MeridianError::AccessDenied(_) => WireErrorCode::AccessDenied,
            MeridianError::StoreUnavailable(_) | MeridianError::ProviderUnavailable(_) => {
                WireErrorCode::Unavailable
            }
            MeridianError::SessionNotFound(_)
            | MeridianError::DepthExceeded(_)
            | MeridianError::Conflict(_)
            | MeridianError::TenantNotFound(_)
            | MeridianError::Fatal(_)
            | MeridianError::Internal(_) => WireErrorCode::InternalError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_exceeded_maps_to_quota_exceeded_code() {
        let err = MeridianError::QuotaExceeded {
            kind: "api_calls_per_minute".into(),
            tenant: "t1".into(),
        };
        assert_eq!(err.wire_code(), WireErrorCode::QuotaExceeded);
    }

    #[test]
    fn access_denied_maps_to_access_denied_code() {
        let err = MeridianError::AccessDenied("no matching policy".into());
        assert_eq!(err.wire_code(), WireErrorCode::AccessDenied);
    }
}
