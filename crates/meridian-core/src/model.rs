//! The shared data model (spec §3): sessions, messages, tool/policy/tenant
//! records, credentials, jobs, and policy evaluation context.

use crate::ids::{AgentId, CredentialId, JobId, PolicyId, SessionId, TenantId, ToolCallMessageId};
use crate::session_key::SessionKey;
use crate::types::{
    MessageRole, QuotaKind, RiskLevel, SessionStatus, SessionType, SideEffect, TenantStatus,
    TenantTier,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// The conversational unit every message belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Opaque identifier.
    pub id: SessionId,
    /// Canonical structured key (spec §6).
    pub key: SessionKey,
    /// Conversation kind, inferred from `key`'s structure.
    pub session_type: SessionType,
    /// Owning tenant, if multi-tenancy applies.
    pub tenant_id: Option<TenantId>,
    /// The principal that opened the session (user id, channel handle, ...).
    pub owner_principal: String,
    /// Originating channel, if any (absent for purely internal subagents).
    pub channel_id: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Parent session, for subagents.
    pub parent_id: Option<SessionId>,
    /// Nesting depth; top-level sessions are 0, subagents up to 3.
    pub depth: u8,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Running token estimate across retained history.
    pub token_count: u64,
    /// Free-form scalar metadata.
    pub metadata: HashMap<String, Value>,
}

impl Session {
    /// The maximum allowed subagent nesting depth (spec §3 invariant).
    pub const MAX_DEPTH: u8 = 3;
}

/// An append-only record belonging to exactly one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Opaque identifier (shared between a `tool_call` and its `tool_result`
    /// is NOT implied; that linkage is carried separately by `tool_call_id`).
    pub id: ToolCallMessageId,
    /// Owning session.
    pub session_id: SessionId,
    /// Monotonic, gap-free sequence number within the session.
    pub seq: u64,
    /// Message role.
    pub role: MessageRole,
    /// Text or structured tool-call/tool-result payload.
    pub content: Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Estimated token cost of this message.
    pub token_estimate: u32,
    /// Tool name, present for `tool_call`/`tool_result` records.
    pub tool_name: Option<String>,
    /// For a `tool_result`, the id of the `tool_call` it answers.
    pub tool_call_id: Option<String>,
    /// Whether this message has been logically subsumed by a later
    /// compaction summary (kept physically, excluded from active context).
    pub superseded: bool,
    /// Free-form metadata (e.g. `summary` sub-role marker).
    pub metadata: HashMap<String, Value>,
}

/// Static description of an invocable tool, registered at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Globally unique tool name.
    pub name: String,
    /// Tag groups this tool belongs to (`fs`, `runtime`, `sessions`, ...).
    pub groups: Vec<String>,
    /// JSON Schema for the tool's input.
    pub input_schema: Value,
    /// Declared side effects, used by policy and the sandbox driver.
    pub side_effects: Vec<SideEffect>,
    /// Whether invocation must route through the Sandbox Driver.
    pub requires_sandbox: bool,
    /// Worst-case risk classification for policy layering.
    pub risk_level: RiskLevel,
}

/// One layer's allow/deny contribution to the Nine-Layer Tool Policy Engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolPolicy {
    /// Policy profile name this layer applies under.
    pub profile: String,
    /// Tool names, group tags, or `"*"` to allow.
    pub allow: Vec<String>,
    /// Tool names, group tags, or `"*"` to deny; always wins over allow.
    pub deny: Vec<String>,
}

/// An access-control policy evaluated by the Access Policy Engine (ABAC).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Opaque identifier.
    pub id: PolicyId,
    /// Human-readable name.
    pub name: String,
    /// Whether a match allows or denies.
    pub effect: PolicyEffect,
    /// Glob patterns over principal identifiers.
    pub principals: Vec<String>,
    /// Glob patterns over resource identifiers.
    pub resources: Vec<String>,
    /// Glob patterns over action identifiers.
    pub actions: Vec<String>,
    /// Evaluation priority; larger values are considered first.
    pub priority: i32,
    /// Optional extra conditions (time/IP/attribute based).
    pub conditions: Vec<PolicyCondition>,
    /// Tenant this policy is scoped to, if any (`None` means global).
    pub tenant_scope: Option<TenantId>,
}

/// The effect of a matching access policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyEffect {
    /// Grants access.
    Allow,
    /// Denies access.
    Deny,
}

/// A single extra condition a policy match must additionally satisfy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyCondition {
    /// Current time of day must fall within `[start, end]`, in `HH:MM` form.
    TimeOfDay {
        /// Inclusive start, `HH:MM`.
        start: String,
        /// Inclusive end, `HH:MM`.
        end: String,
    },
    /// Current weekday (ISO, 1=Monday) must be in this set.
    Weekday {
        /// Allowed ISO weekdays, 1-7.
        days: Vec<u8>,
    },
    /// The caller's IP must fall within one of these CIDR ranges.
    IpInCidr {
        /// CIDR strings, e.g. `"10.0.0.0/8"`.
        cidrs: Vec<String>,
    },
    /// An attribute comparison against the evaluation context.
    Attribute {
        /// Attribute key, looked up in `EvaluationContext::environment`.
        key: String,
        /// Comparison operator.
        op: ConditionOp,
        /// Comparison operand.
        value: Value,
    },
}

/// Comparison operator for attribute-based policy conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOp {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Value is a member of the given array.
    In,
    /// Value is not a member of the given array.
    NotIn,
    /// Numeric greater-than.
    Gt,
    /// Numeric less-than.
    Lt,
    /// Numeric greater-than-or-equal.
    Gte,
    /// Numeric less-than-or-equal.
    Lte,
    /// String/array contains.
    Contains,
}

/// A tenant account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    /// Opaque identifier.
    pub id: TenantId,
    /// Display name.
    pub name: String,
    /// Subscription tier, which seeds default quotas.
    pub tier: TenantTier,
    /// Account status.
    pub status: TenantStatus,
    /// Quota limits, keyed by kind; absent kinds fall back to tier defaults.
    pub quota: HashMap<QuotaKind, u64>,
    /// Allowed models/channels/tools and feature flags.
    pub config: TenantConfig,
}

/// Per-tenant configuration: allowlists and feature flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Allowed LLM model identifiers; empty means no restriction.
    pub allowed_models: Vec<String>,
    /// Allowed channel ids; empty means no restriction.
    pub allowed_channels: Vec<String>,
    /// Allowed tool names/groups; empty means no restriction.
    pub allowed_tools: Vec<String>,
    /// Named boolean feature flags.
    pub feature_flags: HashMap<String, bool>,
}

/// A record in the Credential Pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Opaque identifier.
    pub id: CredentialId,
    /// LLM or channel provider this credential authenticates against.
    pub provider: String,
    /// Opaque secret material; never logged.
    pub secret: String,
    /// Selection priority; higher priority is preferred among eligible
    /// (non-cooling-down) credentials.
    pub priority: i32,
    /// Cooldown expiry, if currently suspended after a failure.
    pub cooldown_until: Option<DateTime<Utc>>,
    /// Consecutive failure count driving the cooldown ladder.
    pub error_count: u32,
    /// Last successful use.
    pub last_used_at: Option<DateTime<Utc>>,
}

/// A scheduler item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Opaque identifier.
    pub id: JobId,
    /// Human-readable name.
    pub name: String,
    /// When this job runs.
    pub schedule: Schedule,
    /// What this job does when it runs.
    pub payload: JobPayload,
    /// The session this job delivers into.
    pub target_session: JobTarget,
    /// Whether the job is currently eligible to fire.
    pub enabled: bool,
    /// Whether the job self-disables (and is pruned) after one run.
    pub delete_after_run: bool,
    /// Mutable runtime state, recomputed across restarts.
    pub state: JobState,
}

/// When a [`Job`] fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Fires exactly once, at `timestamp`.
    At {
        /// The instant to fire at.
        timestamp: DateTime<Utc>,
    },
    /// Fires every `period_s` seconds, optionally anchored to a timestamp.
    Every {
        /// Period, in seconds.
        period_s: u64,
        /// Optional anchor the period is computed from.
        anchor: Option<DateTime<Utc>>,
    },
    /// Fires on a cron expression in the given (or UTC) timezone.
    Cron {
        /// Standard 5 or 6 field cron expression.
        expr: String,
        /// IANA timezone name; defaults to UTC if absent.
        tz: Option<String>,
    },
}

/// What a [`Job`] delivers when it fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    /// Appends a `system` message with this text.
    SystemEvent {
        /// The text to inject.
        text: String,
    },
    /// Runs a full agent turn.
    AgentTurn {
        /// The prompt to inject as if from the user.
        prompt: String,
        /// Model override, if any.
        model: Option<String>,
        /// Channel to deliver the result to, if any.
        deliver: Option<String>,
        /// Channel override for delivery, if any.
        channel: Option<String>,
        /// Timeout in seconds for the turn.
        timeout_s: u64,
    },
}

/// Which session a fired job delivers into.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobTarget {
    /// The owning agent's main session.
    Main {
        /// The agent whose main session receives the delivery.
        agent_id: AgentId,
    },
    /// A fresh, isolated subagent session created per run.
    Isolated {
        /// The agent a fresh subagent session is spawned under.
        agent_id: AgentId,
    },
}

/// Mutable, restart-recomputed scheduler bookkeeping for a [`Job`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobState {
    /// Next scheduled fire time, if any.
    pub next_run_at: Option<DateTime<Utc>>,
    /// Last time this job actually ran.
    pub last_run_at: Option<DateTime<Utc>>,
    /// `"ok"` or `"error"`, from the last run.
    pub last_status: Option<String>,
    /// Error detail from the last run, if it failed.
    pub last_error: Option<String>,
}

/// Ephemeral context for one access-policy evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationContext {
    /// The identity making the request.
    pub principal: String,
    /// The resource being acted on.
    pub resource: String,
    /// The action being attempted.
    pub action: String,
    /// Tenant scope, if any.
    pub tenant_id: Option<TenantId>,
    /// Roles assigned to the principal.
    pub principal_roles: Vec<String>,
    /// Groups the principal belongs to.
    pub principal_groups: Vec<String>,
    /// Caller IP, if known.
    pub ip: Option<String>,
    /// Extra attributes available to `PolicyCondition::Attribute`.
    pub environment: HashMap<String, Value>,
    /// Time the evaluation is performed at.
    pub request_time: DateTime<Utc>,
}

/// The outcome of an access-policy evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    /// The resulting effect.
    pub effect: PolicyEffect,
    /// The policy id that decided, if any matched; `None` means default-deny.
    pub matched_policy_id: Option<PolicyId>,
    /// Human-readable explanation.
    pub reason: String,
    /// Wall-clock cost of the evaluation, in milliseconds.
    pub evaluation_time_ms: f64,
}
