//! Environment-variable overlay (`MERIDIAN_*`).

use crate::types::Config;

/// Apply `MERIDIAN_*` environment variables on top of `cfg`, in place.
///
/// Only scalar fields are supported via env vars; table-shaped fields
/// (`quota_defaults_per_tier`) are configured via the config files instead.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("MERIDIAN_DATA_ROOT") {
        cfg.data_root = v.into();
    }
    if let Ok(v) = std::env::var("MERIDIAN_GATEWAY_BIND") {
        cfg.gateway_bind = v;
    }
    if let Ok(v) = std::env::var("MERIDIAN_DEFAULT_LLM_PROVIDER") {
        cfg.default_llm_provider = v;
    }
    if let Ok(v) = std::env::var("MERIDIAN_DEFAULT_MODEL") {
        cfg.default_model = v;
    }
    if let Ok(v) = std::env::var("MERIDIAN_TOOL_POLICY_PROFILE") {
        cfg.tool_policy_profile = v;
    }
    if let Ok(v) = std::env::var("MERIDIAN_SANDBOX_ENABLED") {
        if let Ok(parsed) = v.parse() {
            cfg.sandbox_enabled = parsed;
        }
    }
    if let Ok(v) = std::env::var("MERIDIAN_SANDBOX_TIMEOUT_S") {
        if let Ok(parsed) = v.parse() {
            cfg.sandbox_timeout_s = parsed;
        }
    }
    if let Ok(v) = std::env::var("MERIDIAN_COMPACTION_SOFT_TOKEN_LIMIT") {
        if let Ok(parsed) = v.parse() {
            cfg.compaction_soft_token_limit = parsed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_only_the_vars_that_are_set() {
        std::env::set_var("MERIDIAN_GATEWAY_BIND", "0.0.0.0:9999");
        std::env::remove_var("MERIDIAN_DEFAULT_MODEL");
        let mut cfg = crate::default_config();
        let original_model = cfg.default_model.clone();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.gateway_bind, "0.0.0.0:9999");
        assert_eq!(cfg.default_model, original_model);
        std::env::remove_var("MERIDIAN_GATEWAY_BIND");
    }
}
