//! Built-in default values — the innermost (lowest-priority) config layer.

use crate::types::Config;
use std::collections::HashMap;
use std::path::PathBuf;

/// The built-in defaults every other layer overrides piecewise.
#[must_use]
pub fn default_config() -> Config {
    let mut quota_defaults_per_tier = HashMap::new();
    quota_defaults_per_tier.insert("free".to_string(), tier_quotas(5, 3, 1_000, 100));
    quota_defaults_per_tier.insert("basic".to_string(), tier_quotas(20, 10, 10_000, 300));
    quota_defaults_per_tier.insert("professional".to_string(), tier_quotas(100, 50, 100_000, 1_000));
    quota_defaults_per_tier.insert("enterprise".to_string(), tier_quotas(1_000, 500, 1_000_000, 10_000));

    Config {
        data_root: default_data_root(),
        gateway_bind: "127.0.0.1:8787".to_string(),
        gateway_protocol_min: 1,
        gateway_protocol_max: 1,
        default_llm_provider: "openai-compat".to_string(),
        default_model: "default".to_string(),
        tool_policy_profile: "coding".to_string(),
        sandbox_enabled: true,
        sandbox_memory_mb: 512,
        sandbox_cpu_pct: 100,
        sandbox_timeout_s: 60,
        compaction_soft_token_limit: 120_000,
        compaction_tail_keep: 10,
        credential_cooldowns: vec![60, 300, 1_500, 3_600],
        policy_cache_max: 10_000,
        policy_cache_ttl_s: 300,
        quota_defaults_per_tier,
        scheduler_poll_interval_ms: 1_000,
        event_bus_subscriber_queue_max: 1_024,
        request_deadline_s: 60,
        agent_max_iterations: 25,
    }
}

fn tier_quotas(sessions: u64, agents: u64, tokens_per_day: u64, api_calls_per_minute: u64) -> HashMap<String, u64> {
    let mut m = HashMap::new();
    m.insert("sessions".to_string(), sessions);
    m.insert("agents".to_string(), agents);
    m.insert("tokens_per_day".to_string(), tokens_per_day);
    m.insert("api_calls_per_minute".to_string(), api_calls_per_minute);
    m.insert("concurrent_requests".to_string(), (agents / 2).max(1));
    m
}

fn default_data_root() -> PathBuf {
    directories::ProjectDirs::from("", "", "meridian")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./meridian-data"))
}
