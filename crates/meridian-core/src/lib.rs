//! Meridian Core — foundation types, ids and error taxonomy shared by every
//! crate in the Meridian gateway workspace.
//!
//! This crate provides:
//! - Opaque, serde-friendly identifiers for every persisted entity
//! - The shared data-model enums from the session/message/tool/policy domain
//! - A single error taxonomy (`MeridianError`) mapped to the Gateway's
//!   bit-exact wire error codes
//! - The `Versioned` marker used by on-disk records

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod ids;
pub mod model;
pub mod prelude;
pub mod session_key;
pub mod types;
pub mod version;

pub use error::{MeridianError, MeridianResult, WireErrorCode};
pub use ids::{
    AgentId, CredentialId, JobId, PolicyId, SessionId, TenantId, ToolCallId, ToolCallMessageId,
};
pub use model::{
    ConditionOp, Credential, Decision, EvaluationContext, Job, JobPayload, JobState, JobTarget,
    Message, Policy, PolicyCondition, PolicyEffect, Schedule, Session, Tenant, TenantConfig,
    ToolDescriptor, ToolPolicy,
};
pub use session_key::{SessionKey, SessionKeyError};
pub use types::{
    MessageRole, QuotaKind, RiskLevel, SessionStatus, SessionType, SideEffect, TenantStatus,
    TenantTier,
};
pub use version::Versioned;
