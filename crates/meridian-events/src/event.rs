//! The fixed catalog of typed events (spec §4.H3).

use meridian_core::{JobId, SessionId, TenantId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single typed event published on the bus.
///
/// Every variant carries enough identifying fields for a subscriber's
/// predicate to filter on session/tenant without deserializing the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A message (of any role) was appended to a session.
    SessionMessage {
        /// The session the message was appended to.
        session_id: SessionId,
        /// The message's sequence number.
        seq: u64,
        /// The message's role (`"user"`, `"assistant"`, ...).
        role: String,
    },
    /// The agent requested a tool call.
    SessionToolCall {
        /// The session the call happened in.
        session_id: SessionId,
        /// The tool name.
        tool_name: String,
        /// Call id, shared with the eventual `SessionToolResult`.
        call_id: String,
    },
    /// A tool call produced a result (or refusal).
    SessionToolResult {
        /// The session the call happened in.
        session_id: SessionId,
        /// Call id, matching the originating `SessionToolCall`.
        call_id: String,
        /// Whether the result represents an error/refusal.
        is_error: bool,
    },
    /// A streamed partial token from the LLM.
    SessionStreamToken {
        /// The session being streamed into.
        session_id: SessionId,
        /// The partial text delta.
        delta: String,
    },
    /// A session underwent compaction.
    SessionCompacted {
        /// The compacted session.
        session_id: SessionId,
        /// Number of physical messages the compaction range covered.
        compacted_count: usize,
    },
    /// An agent turn started.
    AgentStarted {
        /// The session the turn runs in.
        session_id: SessionId,
    },
    /// An agent turn finished (final message, iteration limit, or cancellation).
    AgentCompleted {
        /// The session the turn ran in.
        session_id: SessionId,
        /// Terminal status (`"completed"`, `"iteration_limit"`, `"cancelled"`, `"error"`).
        status: String,
    },
    /// A scheduler job began executing.
    JobRunStarted {
        /// The job that started.
        job_id: JobId,
    },
    /// A scheduler job finished executing.
    JobRunFinished {
        /// The job that finished.
        job_id: JobId,
        /// `"ok"` or `"error"`.
        status: String,
        /// Error detail, if `status == "error"`.
        error: Option<String>,
    },
    /// The Access Policy Engine reached a decision.
    PolicyDecision {
        /// The tenant the decision was scoped to, if any.
        tenant_id: Option<TenantId>,
        /// `"allow"` or `"deny"`.
        effect: String,
        /// The policy id that decided, if any matched.
        matched_policy_id: Option<String>,
    },
    /// A tenant quota or rate limit was exceeded.
    QuotaExceeded {
        /// The tenant that hit the limit.
        tenant_id: TenantId,
        /// The quota kind that was exceeded.
        kind: String,
    },
    /// Escape hatch for forward-compatible/extension events.
    Custom {
        /// Event name.
        name: String,
        /// Arbitrary JSON payload.
        payload: Value,
    },
}

impl Event {
    /// The session this event pertains to, if any — used for per-session
    /// FIFO ordering guarantees and `session_key`-pattern subscriptions.
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            Event::SessionMessage { session_id, .. }
            | Event::SessionToolCall { session_id, .. }
            | Event::SessionToolResult { session_id, .. }
            | Event::SessionStreamToken { session_id, .. }
            | Event::SessionCompacted { session_id, .. }
            | Event::AgentStarted { session_id }
            | Event::AgentCompleted { session_id, .. } => Some(*session_id),
            _ => None,
        }
    }

    /// The stable event-name string used for glob-pattern subscriptions
    /// (e.g. `"session.message"`, `"job.run_finished"`).
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Event::SessionMessage { .. } => "session.message",
            Event::SessionToolCall { .. } => "session.tool_call",
            Event::SessionToolResult { .. } => "session.tool_result",
            Event::SessionStreamToken { .. } => "session.stream_token",
            Event::SessionCompacted { .. } => "session.compacted",
            Event::AgentStarted { .. } => "agent.started",
            Event::AgentCompleted { .. } => "agent.completed",
            Event::JobRunStarted { .. } => "job.run_started",
            Event::JobRunFinished { .. } => "job.run_finished",
            Event::PolicyDecision { .. } => "policy.decision",
            Event::QuotaExceeded { .. } => "quota.exceeded",
            Event::Custom { .. } => "custom",
        }
    }
}
