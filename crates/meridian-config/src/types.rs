//! The recognized configuration options (spec §6, illustrative subset).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// The full set of options a Meridian deployment recognizes.
///
/// Every field has a default (see [`crate::default_config`]); nothing here is
/// required to be present in any one layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory for the file-layout Storage Port (spec §6).
    pub data_root: PathBuf,
    /// Bind address for the Gateway's WebSocket listener.
    pub gateway_bind: String,
    /// Lowest Gateway protocol version this server will negotiate.
    pub gateway_protocol_min: u32,
    /// Highest Gateway protocol version this server will negotiate.
    pub gateway_protocol_max: u32,
    /// Default LLM provider name used when a session/agent doesn't override it.
    pub default_llm_provider: String,
    /// Default model identifier passed to the LLM Port.
    pub default_model: String,
    /// Default Tool Policy Engine profile (layer 1 base allow-set).
    pub tool_policy_profile: String,
    /// Whether tool calls run through the Sandbox Driver by default.
    pub sandbox_enabled: bool,
    /// Sandbox memory ceiling, in megabytes.
    pub sandbox_memory_mb: u64,
    /// Sandbox CPU ceiling, as a percentage of one core.
    pub sandbox_cpu_pct: u32,
    /// Sandbox wall-clock timeout, in seconds.
    pub sandbox_timeout_s: u64,
    /// Soft token-count threshold that triggers compaction.
    pub compaction_soft_token_limit: u64,
    /// Minimum number of most-recent messages compaction must preserve verbatim.
    pub compaction_tail_keep: usize,
    /// Credential cooldown ladder, in seconds, keyed by consecutive failure count.
    pub credential_cooldowns: Vec<u64>,
    /// Maximum number of entries in the Access Policy evaluation cache.
    pub policy_cache_max: usize,
    /// Time-to-live for Access Policy cache entries, in seconds.
    pub policy_cache_ttl_s: u64,
    /// Default per-tier quota table (tier name -> kind name -> limit).
    pub quota_defaults_per_tier: HashMap<String, HashMap<String, u64>>,
    /// How often the Scheduler wakes to recompute next-fire times, in milliseconds.
    pub scheduler_poll_interval_ms: u64,
    /// Maximum queued events per Event Bus subscriber before it is dropped.
    pub event_bus_subscriber_queue_max: usize,
    /// Default deadline for externally originated requests, in seconds.
    pub request_deadline_s: u64,
    /// Maximum Agent Runtime tool-use loop iterations per turn.
    pub agent_max_iterations: u32,
}

impl Default for Config {
    fn default() -> Self {
        crate::default_config()
    }
}
