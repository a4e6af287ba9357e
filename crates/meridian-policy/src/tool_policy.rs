//! The Nine-Layer Tool Policy Engine (spec §4.M1).

use meridian_core::ToolPolicy;
use meridian_registry::ToolRegistry;
use std::collections::HashSet;

/// The nine ordered layers a single agent call's tool filter is computed
/// from. Every layer but the base `profile` is optional; absent layers
/// contribute nothing.
#[derive(Debug, Clone, Default)]
pub struct FilterContext {
    /// Layer 1 — named profile (`minimal`, `coding`, `messaging`, `full`),
    /// providing the base allow set.
    pub profile: Option<ToolPolicy>,
    /// Layer 2 — per-LLM-provider overlay of the profile.
    pub provider_profile: Option<ToolPolicy>,
    /// Layer 3 — system-wide floor/ceiling.
    pub global: Option<ToolPolicy>,
    /// Layer 4 — provider-specific global overlay.
    pub global_provider: Option<ToolPolicy>,
    /// Layer 5 — per-agent configuration.
    pub agent: Option<ToolPolicy>,
    /// Layer 6 — combined agent + provider overlay.
    pub agent_provider: Option<ToolPolicy>,
    /// Layer 7 — restrictions for the originating channel/group.
    pub group_channel: Option<ToolPolicy>,
    /// Layer 8 — extra restrictions when running under sandbox.
    pub sandbox: Option<ToolPolicy>,
    /// Layer 9 — restrictions applied to spawned subagents.
    pub subagent: Option<ToolPolicy>,
}

impl FilterContext {
    fn layers_in_order(&self) -> [Option<&ToolPolicy>; 9] {
        [
            self.profile.as_ref(),
            self.provider_profile.as_ref(),
            self.global.as_ref(),
            self.global_provider.as_ref(),
            self.agent.as_ref(),
            self.agent_provider.as_ref(),
            self.group_channel.as_ref(),
            self.sandbox.as_ref(),
            self.subagent.as_ref(),
        ]
    }
}

/// Compute the allowed tool set for `ctx` against `registry`.
///
/// Each layer applies as `(accumulated ∪ allow) \ deny` after expanding
/// group tags through the registry; an empty allow list never resets the
/// accumulated set, only deny lists remove entries. The result is already
/// intersected with registered tool names, since [`ToolRegistry::expand`]
/// silently drops unknown names. Identical inputs always yield identical,
/// deterministically ordered output.
#[must_use]
pub fn compute_allowed_tools(ctx: &FilterContext, registry: &ToolRegistry) -> Vec<String> {
    let mut current: HashSet<String> = HashSet::new();
    for layer in ctx.layers_in_order().into_iter().flatten() {
        let allow: HashSet<String> = registry.expand(&layer.allow).into_iter().collect();
        let deny: HashSet<String> = registry.expand(&layer.deny).into_iter().collect();
        current = current.union(&allow).cloned().collect::<HashSet<_>>().difference(&deny).cloned().collect();
    }
    let mut result: Vec<String> = current.into_iter().collect();
    result.sort();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::{RiskLevel, SideEffect, ToolDescriptor};

    fn registry_with(names: &[&str]) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for name in names {
            registry
                .register(ToolDescriptor {
                    name: (*name).to_string(),
                    groups: vec!["fs".to_string()],
                    input_schema: serde_json::json!({}),
                    side_effects: vec![SideEffect::Read],
                    requires_sandbox: false,
                    risk_level: RiskLevel::Low,
                })
                .unwrap();
        }
        registry
    }

    fn policy(allow: &[&str], deny: &[&str]) -> ToolPolicy {
        ToolPolicy {
            profile: "test".into(),
            allow: allow.iter().map(|s| s.to_string()).collect(),
            deny: deny.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn later_deny_removes_an_earlier_layers_allow() {
        let registry = registry_with(&["read_file", "write_file", "bash"]);
        let ctx = FilterContext {
            profile: Some(policy(&["read_file", "write_file", "bash"], &[])),
            sandbox: Some(policy(&[], &["bash"])),
            ..Default::default()
        };
        let allowed = compute_allowed_tools(&ctx, &registry);
        assert_eq!(allowed, vec!["read_file", "write_file"]);
    }

    #[test]
    fn empty_allow_list_does_not_reset_accumulated_set() {
        let registry = registry_with(&["read_file"]);
        let ctx = FilterContext {
            profile: Some(policy(&["read_file"], &[])),
            agent: Some(policy(&[], &[])),
            ..Default::default()
        };
        assert_eq!(compute_allowed_tools(&ctx, &registry), vec!["read_file"]);
    }

    #[test]
    fn is_deterministic_for_identical_input() {
        let registry = registry_with(&["read_file", "write_file"]);
        let ctx = FilterContext {
            profile: Some(policy(&["group:fs"], &[])),
            ..Default::default()
        };
        let first = compute_allowed_tools(&ctx, &registry);
        let second = compute_allowed_tools(&ctx, &registry);
        assert_eq!(first, second);
    }

    #[test]
    fn unregistered_tool_names_never_appear() {
        let registry = registry_with(&["read_file"]);
        let ctx = FilterContext {
            profile: Some(policy(&["read_file", "nonexistent"], &[])),
            ..Default::default()
        };
        assert_eq!(compute_allowed_tools(&ctx, &registry), vec!["read_file"]);
    }
}
