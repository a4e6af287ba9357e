//! Shared data-model enums (spec §3).

use serde::{Deserialize, Serialize};

/// The kind of conversational unit a session represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    /// The agent's primary, always-on conversation.
    Main,
    /// A multi-participant group chat.
    Group,
    /// A one-on-one direct message.
    Dm,
    /// A threaded sub-conversation within a group.
    Topic,
    /// A child session spawned to delegate a bounded sub-task.
    Subagent,
}

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Currently receiving turns.
    Active,
    /// No recent activity but not yet archived.
    Idle,
    /// Has undergone at least one compaction pass.
    Compacted,
    /// Tombstoned; no further appends are accepted.
    Archived,
}

/// The role of a single message record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// Text from the human/channel side.
    User,
    /// Text produced by the LLM.
    Assistant,
    /// Injected system content (bootstrap, scheduler events, summaries).
    System,
    /// The assistant requesting a tool invocation.
    ToolCall,
    /// The result of a tool invocation.
    ToolResult,
}

/// Declared side effect of a tool, used by the Sandbox Driver and policy
/// layers to decide what isolation a call needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    /// Reads state without mutating anything observable.
    Read,
    /// Mutates local state (filesystem, session metadata, ...).
    Write,
    /// Executes an external process.
    Exec,
    /// Performs outbound network I/O.
    Network,
    /// Sends a message to an external channel/recipient.
    Send,
}

/// Risk classification used when a tool call is weighed against policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// No material risk.
    Low,
    /// Reversible but consequential.
    Medium,
    /// Hard to reverse or broad in blast radius.
    High,
    /// Destructive or irreversible.
    Critical,
}

/// Named, countable budget attached to a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaKind {
    /// Number of distinct agents a tenant may run.
    Agents,
    /// Number of concurrently open sessions.
    Sessions,
    /// Number of installed plugins/connectors.
    Plugins,
    /// Number of distinct tools a tenant may invoke.
    Tools,
    /// Rolling daily LLM token budget.
    TokensPerDay,
    /// Rolling per-minute API call rate limit.
    ApiCallsPerMinute,
    /// Concurrency semaphore size for in-flight requests.
    ConcurrentRequests,
    /// Storage footprint budget, in megabytes.
    StorageMb,
    /// Per-session message count cap.
    MessagesPerSession,
    /// Maximum context length (tokens) a tenant's sessions may grow to.
    ContextLength,
}

impl QuotaKind {
    /// All quota kinds, for iterating default-quota tables.
    #[must_use]
    pub fn all() -> &'static [QuotaKind] {
        use QuotaKind::*;
        &[
            Agents,
            Sessions,
            Plugins,
            Tools,
            TokensPerDay,
            ApiCallsPerMinute,
            ConcurrentRequests,
            StorageMb,
            MessagesPerSession,
            ContextLength,
        ]
    }

    /// Whether this kind is evaluated as a rolling rate limit (vs. an
    /// absolute ceiling checked on every increment).
    #[must_use]
    pub fn is_rate_limited(self) -> bool {
        matches!(self, QuotaKind::ApiCallsPerMinute | QuotaKind::TokensPerDay)
    }
}

/// Tenant subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantTier {
    /// No-cost tier with the tightest quotas.
    Free,
    /// Entry paid tier.
    Basic,
    /// Mid paid tier.
    Professional,
    /// Top paid tier, largest quotas.
    Enterprise,
}

/// Tenant account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    /// Normal operation.
    Active,
    /// Administratively disabled.
    Suspended,
    /// Time-boxed evaluation period.
    Trial,
    /// Subscription lapsed.
    Expired,
}
