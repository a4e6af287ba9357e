//! Audit entry types.

use chrono::{DateTime, Utc};
use meridian_core::{PolicyId, SessionId, TenantId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry identifier.
    pub id: Uuid,
    /// When the action happened.
    pub timestamp: DateTime<Utc>,
    /// Session the action relates to, if any.
    pub session_id: Option<SessionId>,
    /// Tenant the action relates to, if any.
    pub tenant_id: Option<TenantId>,
    /// What happened.
    pub action: AuditAction,
    /// How it turned out.
    pub outcome: AuditOutcome,
}

impl AuditEntry {
    /// Build a new entry stamped with the current time.
    #[must_use]
    pub fn new(
        session_id: Option<SessionId>,
        tenant_id: Option<TenantId>,
        action: AuditAction,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            session_id,
            tenant_id,
            action,
            outcome,
        }
    }
}

/// The security-relevant action an entry records.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditAction {
    /// A tool call was dispatched through the Sandbox Driver.
    ToolCall {
        /// Tool name.
        tool: String,
        /// Call id, shared with the eventual result.
        call_id: String,
    },
    /// The Nine-Layer Tool Policy Engine computed an allow set.
    ToolPolicyComputed {
        /// Profile the computation used.
        profile: String,
        /// Number of tools in the resulting allow set.
        allowed_count: usize,
    },
    /// The Access Policy Engine reached a decision.
    AccessDecision {
        /// The policy id that decided, if any.
        matched_policy_id: Option<PolicyId>,
        /// `"allow"` or `"deny"`.
        effect: String,
    },
    /// A quota or rate limit was checked and exceeded.
    QuotaExceeded {
        /// The quota kind that was exceeded.
        kind: String,
    },
    /// A credential was rotated after a failure.
    CredentialRotated {
        /// Provider the credential authenticates against.
        provider: String,
        /// Consecutive failure count at time of rotation.
        error_count: u32,
    },
    /// A session was created.
    SessionCreated {
        /// The owning principal.
        owner_principal: String,
    },
    /// A session was archived.
    SessionArchived,
    /// A session underwent compaction.
    SessionCompacted {
        /// Number of messages the compaction range covered.
        compacted_count: usize,
    },
    /// An admin mutated a policy, tenant, or credential record.
    AdminMutation {
        /// The kind of record mutated (`"policy"`, `"tenant"`, `"credential"`, `"job"`).
        resource_kind: String,
        /// The id of the mutated record.
        resource_id: String,
    },
}

/// Outcome of an audited action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditOutcome {
    /// The action succeeded.
    Success {
        /// Optional free-form detail.
        details: Option<String>,
    },
    /// The action failed or was refused.
    Failure {
        /// Error or refusal reason.
        error: String,
    },
}

impl AuditOutcome {
    /// A bare success outcome.
    #[must_use]
    pub fn success() -> Self {
        Self::Success { details: None }
    }

    /// A failure outcome carrying `error`.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure { error: error.into() }
    }
}
