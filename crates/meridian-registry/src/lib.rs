//! The Tool Registry (spec §4.L1): static `ToolDescriptor`s registered once
//! at startup, with group-tag expansion used by the Nine-Layer Tool Policy
//! Engine.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;

pub use error::{RegistryError, RegistryResult};

use meridian_core::{RiskLevel, SideEffect, ToolDescriptor};
use std::collections::HashMap;
use tracing::warn;

/// A `group:<tag>` reference, or a bare tool name.
enum PatternEntry<'a> {
    Group(&'a str),
    Name(&'a str),
}

fn parse_entry(entry: &str) -> PatternEntry<'_> {
    match entry.strip_prefix("group:") {
        Some(tag) => PatternEntry::Group(tag),
        None => PatternEntry::Name(entry),
    }
}

/// Immutable-after-startup registry of every tool the runtime can dispatch.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolDescriptor>,
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with a small illustrative set of tool
    /// descriptors, so the crate is exercisable without callers hand-writing
    /// descriptors first: `shell_exec`, `read_file`, `write_file`,
    /// `web_fetch`, `send_message`, `schedule_job`.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for descriptor in builtin_descriptors() {
            registry.register(descriptor).expect("builtin tool names are unique");
        }
        registry
    }

    /// Register a descriptor. Fails if the name is already taken.
    pub fn register(&mut self, descriptor: ToolDescriptor) -> RegistryResult<()> {
        if self.tools.contains_key(&descriptor.name) {
            return Err(RegistryError::DuplicateName(descriptor.name));
        }
        self.tools.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Look up a single tool by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    /// All registered descriptors, in registration order is not guaranteed.
    pub fn describe_all(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.values()
    }

    /// Expand a mixed list of tool names and `group:<tag>` entries into the
    /// union of matching, currently-registered tool names.
    ///
    /// Unknown bare names are silently dropped; unknown groups are logged
    /// (not fatal) per spec §4.L1.
    #[must_use]
    pub fn expand(&self, entries: &[String]) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for entry in entries {
            match parse_entry(entry) {
                PatternEntry::Name(name) if name == "*" => {
                    for tool_name in self.tools.keys() {
                        if seen.insert(tool_name.clone()) {
                            out.push(tool_name.clone());
                        }
                    }
                }
                PatternEntry::Name(name) => {
                    if self.tools.contains_key(name) && seen.insert(name.to_string()) {
                        out.push(name.to_string());
                    }
                }
                PatternEntry::Group(tag) => {
                    let mut matched_any = false;
                    for tool in self.tools.values() {
                        if tool.groups.iter().any(|g| g == tag) {
                            matched_any = true;
                            if seen.insert(tool.name.clone()) {
                                out.push(tool.name.clone());
                            }
                        }
                    }
                    if !matched_any {
                        warn!(group = tag, "tool policy referenced an unknown group tag");
                    }
                }
            }
        }
        out
    }
}

fn builtin_descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: "shell_exec".to_string(),
            groups: vec!["runtime".to_string(), "fs".to_string()],
            input_schema: serde_json::json!({
                "type": "object",
                "properties": { "command": { "type": "string" } },
                "required": ["command"],
            }),
            side_effects: vec![SideEffect::Exec, SideEffect::Write],
            requires_sandbox: true,
            risk_level: RiskLevel::High,
        },
        ToolDescriptor {
            name: "read_file".to_string(),
            groups: vec!["fs".to_string()],
            input_schema: serde_json::json!({
                "type": "object",
                "properties": { "path": { "type": "string" } },
                "required": ["path"],
            }),
            side_effects: vec![SideEffect::Read],
            requires_sandbox: false,
            risk_level: RiskLevel::Low,
        },
        ToolDescriptor {
            name: "write_file".to_string(),
            groups: vec!["fs".to_string()],
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                    "content": { "type": "string" },
                },
                "required": ["path", "content"],
            }),
            side_effects: vec![SideEffect::Write],
            requires_sandbox: true,
            risk_level: RiskLevel::Medium,
        },
        ToolDescriptor {
            name: "web_fetch".to_string(),
            groups: vec!["web".to_string()],
            input_schema: serde_json::json!({
                "type": "object",
                "properties": { "url": { "type": "string" } },
                "required": ["url"],
            }),
            side_effects: vec![SideEffect::Network],
            requires_sandbox: false,
            risk_level: RiskLevel::Medium,
        },
        ToolDescriptor {
            name: "send_message".to_string(),
            groups: vec!["messaging".to_string()],
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "channel": { "type": "string" },
                    "text": { "type": "string" },
                },
                "required": ["channel", "text"],
            }),
            side_effects: vec![SideEffect::Send],
            requires_sandbox: false,
            risk_level: RiskLevel::Low,
        },
        ToolDescriptor {
            name: "schedule_job".to_string(),
            groups: vec!["automation".to_string()],
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "cron": { "type": "string" },
                    "prompt": { "type": "string" },
                },
                "required": ["name", "cron", "prompt"],
            }),
            side_effects: vec![SideEffect::Write],
            requires_sandbox: false,
            risk_level: RiskLevel::Medium,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::{RiskLevel, SideEffect};

    fn descriptor(name: &str, groups: &[&str]) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            groups: groups.iter().map(|s| s.to_string()).collect(),
            input_schema: serde_json::json!({}),
            side_effects: vec![SideEffect::Read],
            requires_sandbox: false,
            risk_level: RiskLevel::Low,
        }
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = ToolRegistry::new();
        registry.register(descriptor("read_file", &["fs"])).unwrap();
        let err = registry.register(descriptor("read_file", &["fs"])).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateName(_)));
    }

    #[test]
    fn expand_unions_names_and_groups_and_drops_unknown_names() {
        let mut registry = ToolRegistry::new();
        registry.register(descriptor("read_file", &["fs"])).unwrap();
        registry.register(descriptor("write_file", &["fs"])).unwrap();
        registry.register(descriptor("send_message", &["messaging"])).unwrap();

        let expanded = registry.expand(&[
            "group:fs".to_string(),
            "send_message".to_string(),
            "nonexistent_tool".to_string(),
        ]);
        let mut sorted = expanded.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["read_file", "send_message", "write_file"]);
    }

    #[test]
    fn expand_unknown_group_logs_but_is_not_fatal() {
        let registry = ToolRegistry::new();
        let expanded = registry.expand(&["group:nonexistent".to_string()]);
        assert!(expanded.is_empty());
    }

    #[test]
    fn builtin_registers_the_illustrative_tool_set() {
        let registry = ToolRegistry::builtin();
        for name in ["shell_exec", "read_file", "write_file", "web_fetch", "send_message", "schedule_job"] {
            assert!(registry.lookup(name).is_some(), "expected builtin tool {name}");
        }
        assert!(registry.lookup("shell_exec").unwrap().requires_sandbox);
        assert!(!registry.lookup("read_file").unwrap().requires_sandbox);
    }
}
