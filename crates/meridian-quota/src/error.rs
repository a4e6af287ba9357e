//! Quota Manager errors.

use meridian_core::QuotaKind;

/// Render a [`QuotaKind`] as the snake_case string used in wire errors and
/// audit entries.
#[must_use]
pub fn quota_kind_name(kind: QuotaKind) -> &'static str {
    match kind {
        QuotaKind::Agents => "agents",
        QuotaKind::Sessions => "sessions",
        QuotaKind::Plugins => "plugins",
        QuotaKind::Tools => "tools",
        QuotaKind::TokensPerDay => "tokens_per_day",
        QuotaKind::ApiCallsPerMinute => "api_calls_per_minute",
        QuotaKind::ConcurrentRequests => "concurrent_requests",
        QuotaKind::StorageMb => "storage_mb",
        QuotaKind::MessagesPerSession => "messages_per_session",
        QuotaKind::ContextLength => "context_length",
    }
}

/// Errors from quota operations.
#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    /// The tenant has no quota record.
    #[error("tenant not found: {0}")]
    TenantNotFound(String),
    /// The requested increment would exceed (or already exceeds) the limit.
    #[error("quota exceeded for tenant {tenant} kind {kind:?}")]
    Exceeded {
        /// The tenant that hit the limit.
        tenant: String,
        /// The quota kind that was exceeded.
        kind: QuotaKind,
    },
    /// A concurrency slot could not be acquired before the timeout elapsed.
    #[error("timed out acquiring a concurrency slot for tenant {0}")]
    SlotTimeout(String),
}

/// Result type for quota operations.
pub type QuotaResult<T> = Result<T, QuotaError>;

impl From<QuotaError> for meridian_core::MeridianError {
    fn from(err: QuotaError) -> Self {
        match err {
            QuotaError::TenantNotFound(tenant) => meridian_core::MeridianError::TenantNotFound(tenant),
            QuotaError::Exceeded { tenant, kind } => meridian_core::MeridianError::QuotaExceeded {
                kind: quota_kind_name(kind).to_string(),
                tenant,
            },
            QuotaError::SlotTimeout(tenant) => meridian_core::MeridianError::QuotaExceeded {
                kind: quota_kind_name(QuotaKind::ConcurrentRequests).to_string(),
                tenant,
            },
        }
    }
}
