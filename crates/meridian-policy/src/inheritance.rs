//! Permission inheritance across the tenant → group → user DAG (spec §4.M2).

use crate::error::PolicyError;
use std::collections::{HashMap, HashSet};

/// One node's directly-assigned permission sets.
#[derive(Debug, Clone, Default)]
struct NodeGrants {
    parents: Vec<String>,
    granted: HashSet<String>,
    denied: HashSet<String>,
}

/// The resolved permission set for a node: its own grants/denies unioned
/// with everything inherited from ancestors, with deny always winning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPermissions {
    /// Permissions granted by this node or an ancestor, and not denied
    /// anywhere in the chain.
    pub granted: HashSet<String>,
    /// Permissions denied by this node or any ancestor.
    pub denied: HashSet<String>,
}

impl ResolvedPermissions {
    /// Whether `permission` is in effect: granted somewhere in the chain and
    /// not denied anywhere in it.
    #[must_use]
    pub fn allows(&self, permission: &str) -> bool {
        self.granted.contains(permission) && !self.denied.contains(permission)
    }
}

/// A DAG of tenant → group → user permission nodes, resolved by unioning
/// ancestor grants and denies, with deny overriding grant regardless of
/// which node in the chain it came from.
#[derive(Debug, Default)]
pub struct InheritanceManager {
    nodes: HashMap<String, NodeGrants>,
}

impl InheritanceManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a node's direct grants/denies and parent edges.
    /// Rejects edges that would introduce a cycle.
    pub fn upsert_node(
        &mut self,
        node_id: impl Into<String>,
        parents: Vec<String>,
        granted: HashSet<String>,
        denied: HashSet<String>,
    ) -> Result<(), PolicyError> {
        let node_id = node_id.into();
        for parent in &parents {
            if self.creates_cycle(parent, &node_id) {
                return Err(PolicyError::InheritanceCycle(node_id.clone()));
            }
        }
        self.nodes.insert(
            node_id,
            NodeGrants {
                parents,
                granted,
                denied,
            },
        );
        Ok(())
    }

    /// Whether following `from`'s ancestor chain ever reaches `target`,
    /// which would mean adding `target -> from` as a parent edge closes a
    /// cycle.
    fn creates_cycle(&self, from: &str, target: &str) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![from.to_string()];
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get(&current) {
                stack.extend(node.parents.iter().cloned());
            }
        }
        false
    }

    /// Resolve the effective permissions for `node_id`, walking its ancestor
    /// chain. Diamond inheritance (a node reachable via two paths) is
    /// deduplicated via a visited set, so its grants/denies are only
    /// counted once. Deny always overrides grant, regardless of which
    /// ancestor contributed which.
    #[must_use]
    pub fn resolve(&self, node_id: &str) -> ResolvedPermissions {
        let mut granted = HashSet::new();
        let mut denied = HashSet::new();
        let mut visited = HashSet::new();
        let mut stack = vec![node_id.to_string()];
        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get(&current) {
                granted.extend(node.granted.iter().cloned());
                denied.extend(node.denied.iter().cloned());
                stack.extend(node.parents.iter().cloned());
            }
        }
        ResolvedPermissions { granted, denied }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn resolves_grants_across_the_ancestor_chain() {
        let mut mgr = InheritanceManager::new();
        mgr.upsert_node("tenant:acme", vec![], set(&["read"]), set(&[])).unwrap();
        mgr.upsert_node("group:eng", vec!["tenant:acme".into()], set(&["write"]), set(&[]))
            .unwrap();
        mgr.upsert_node("user:alice", vec!["group:eng".into()], set(&[]), set(&[]))
            .unwrap();

        let resolved = mgr.resolve("user:alice");
        assert!(resolved.allows("read"));
        assert!(resolved.allows("write"));
    }

    #[test]
    fn ancestor_deny_overrides_descendant_grant() {
        let mut mgr = InheritanceManager::new();
        mgr.upsert_node("tenant:acme", vec![], set(&[]), set(&["delete_account"]))
            .unwrap();
        mgr.upsert_node(
            "user:alice",
            vec!["tenant:acme".into()],
            set(&["delete_account"]),
            set(&[]),
        )
        .unwrap();

        let resolved = mgr.resolve("user:alice");
        assert!(!resolved.allows("delete_account"));
    }

    #[test]
    fn diamond_inheritance_is_deduplicated_not_double_counted() {
        let mut mgr = InheritanceManager::new();
        mgr.upsert_node("tenant:acme", vec![], set(&["read"]), set(&[])).unwrap();
        mgr.upsert_node("group:a", vec!["tenant:acme".into()], set(&[]), set(&[])).unwrap();
        mgr.upsert_node("group:b", vec!["tenant:acme".into()], set(&[]), set(&[])).unwrap();
        mgr.upsert_node(
            "user:alice",
            vec!["group:a".into(), "group:b".into()],
            set(&[]),
            set(&[]),
        )
        .unwrap();

        let resolved = mgr.resolve("user:alice");
        assert!(resolved.allows("read"));
    }

    #[test]
    fn cycle_creating_edges_are_rejected() {
        let mut mgr = InheritanceManager::new();
        mgr.upsert_node("a", vec![], set(&[]), set(&[])).unwrap();
        mgr.upsert_node("b", vec!["a".into()], set(&[]), set(&[])).unwrap();
        let err = mgr.upsert_node("a", vec!["b".into()], set(&[]), set(&[])).unwrap_err();
        assert!(matches!(err, PolicyError::InheritanceCycle(_)));
    }
}
