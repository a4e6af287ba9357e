//! Convenience re-exports for downstream crates.

pub use crate::error::{MeridianError, MeridianResult, WireErrorCode};
pub use crate::ids::{
    AgentId, CredentialId, JobId, PolicyId, SessionId, TenantId, ToolCallId, ToolCallMessageId,
};
pub use crate::model::{
    ConditionOp, Credential, Decision, EvaluationContext, Job, JobPayload, JobState, JobTarget,
    Message, Policy, PolicyCondition, PolicyEffect, Schedule, Session, Tenant, TenantConfig,
    ToolDescriptor, ToolPolicy,
};
pub use crate::session_key::{SessionKey, SessionKeyError};
pub use crate::types::{
    MessageRole, QuotaKind, RiskLevel, SessionStatus, SessionType, SideEffect, TenantStatus,
    TenantTier,
};
pub use crate::version::Versioned;
