//! The Access Policy Engine (spec §4.M2): attribute-based access control
//! with a TTL evaluation cache sitting in front of glob-pattern candidate
//! selection and condition evaluation.

use crate::error::{PolicyError, PolicyResult};
use chrono::{Datelike, NaiveTime};
use dashmap::DashMap;
use meridian_core::{ConditionOp, Decision, EvaluationContext, Policy, PolicyCondition, PolicyEffect, PolicyId};
use meridian_storage::PolicyStore;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::warn;

struct CacheEntry {
    decision: Decision,
    inserted_at: Instant,
}

/// Callback invoked with every evaluation's context and outcome, for audit
/// logging. Not called on cache hits' recomputation, only on the first
/// evaluation that produced the cached decision.
pub type AuditHook = Box<dyn Fn(&EvaluationContext, &Decision) + Send + Sync>;

/// Evaluates [`EvaluationContext`]s against the stored [`Policy`] set.
///
/// Candidate policies are those whose `principals`/`resources`/`actions`
/// glob patterns (plus `role:`, `tenant:`, and prefix forms) match the
/// context and whose `tenant_scope` matches (or is global). Candidates are
/// sorted by `(priority DESC, deny-before-allow)`; the first whose
/// conditions all hold decides. No match is a default deny.
pub struct AccessPolicyEngine {
    store: PolicyStore,
    policies: RwLock<Vec<Policy>>,
    cache: DashMap<String, CacheEntry>,
    cache_ttl: Duration,
    audit: Option<AuditHook>,
}

impl AccessPolicyEngine {
    /// Load the full policy set from `store` and build an engine with the
    /// given cache TTL. Fails if the store is unavailable (callers must
    /// treat construction failure as fail-closed).
    pub async fn new(store: PolicyStore, cache_ttl: Duration) -> PolicyResult<Self> {
        let policies = store.list().await?;
        Ok(Self {
            store,
            policies: RwLock::new(policies),
            cache: DashMap::new(),
            cache_ttl,
            audit: None,
        })
    }

    /// Attach an audit hook, replacing any previous one.
    #[must_use]
    pub fn with_audit_hook(mut self, hook: AuditHook) -> Self {
        self.audit = Some(hook);
        self
    }

    /// Create or replace a policy and invalidate the evaluation cache.
    pub async fn put_policy(&self, policy: Policy) -> PolicyResult<()> {
        self.store.put(&policy).await?;
        let mut policies = self.policies.write().expect("policy lock poisoned");
        policies.retain(|p| p.id != policy.id);
        policies.push(policy);
        drop(policies);
        self.cache.clear();
        Ok(())
    }

    /// Remove a policy and invalidate the evaluation cache.
    pub async fn delete_policy(&self, id: &PolicyId) -> PolicyResult<()> {
        self.store.delete(id).await?;
        self.policies.write().expect("policy lock poisoned").retain(|p| p.id != *id);
        self.cache.clear();
        Ok(())
    }

    fn cache_key(ctx: &EvaluationContext) -> String {
        let mut env: Vec<(&String, &serde_json::Value)> = ctx.environment.iter().collect();
        env.sort_by(|a, b| a.0.cmp(b.0));
        let env_str = env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "{}|{}|{}|{:?}|{:?}|{}",
            ctx.principal, ctx.resource, ctx.action, ctx.tenant_id, ctx.ip, env_str
        )
    }

    /// Evaluate `ctx`, consulting (and populating) the cache.
    pub async fn evaluate(&self, ctx: &EvaluationContext) -> Decision {
        let key = Self::cache_key(ctx);
        if let Some(entry) = self.cache.get(&key) {
            if entry.inserted_at.elapsed() < self.cache_ttl {
                return entry.decision.clone();
            }
        }

        let start = Instant::now();
        let decision = self.evaluate_uncached(ctx);
        let decision = Decision {
            evaluation_time_ms: start.elapsed().as_secs_f64() * 1000.0,
            ..decision
        };

        self.cache.insert(
            key,
            CacheEntry {
                decision: decision.clone(),
                inserted_at: Instant::now(),
            },
        );
        if let Some(hook) = &self.audit {
            hook(ctx, &decision);
        }
        decision
    }

    fn evaluate_uncached(&self, ctx: &EvaluationContext) -> Decision {
        let policies = self.policies.read().expect("policy lock poisoned");
        let mut candidates: Vec<&Policy> = policies
            .iter()
            .filter(|p| tenant_scope_matches(p, ctx))
            .filter(|p| patterns_match(p, ctx))
            .collect();
        candidates.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| effect_rank(a.effect).cmp(&effect_rank(b.effect)))
        });

        for policy in candidates {
            match conditions_hold(policy, ctx) {
                Ok(true) => {
                    return Decision {
                        effect: policy.effect,
                        matched_policy_id: Some(policy.id),
                        reason: format!("matched policy \"{}\"", policy.name),
                        evaluation_time_ms: 0.0,
                    };
                }
                Ok(false) => continue,
                Err(err) => {
                    warn!(policy_id = %policy.id, error = %err, "skipping policy with malformed condition");
                    continue;
                }
            }
        }

        Decision {
            effect: PolicyEffect::Deny,
            matched_policy_id: None,
            reason: "no matching policy".to_string(),
            evaluation_time_ms: 0.0,
        }
    }
}

/// Deny sorts before allow at equal priority, so a tie goes to the safer
/// outcome.
fn effect_rank(effect: PolicyEffect) -> u8 {
    match effect {
        PolicyEffect::Deny => 0,
        PolicyEffect::Allow => 1,
    }
}

fn tenant_scope_matches(policy: &Policy, ctx: &EvaluationContext) -> bool {
    match &policy.tenant_scope {
        None => true,
        Some(scope) => ctx.tenant_id.as_ref() == Some(scope),
    }
}

fn patterns_match(policy: &Policy, ctx: &EvaluationContext) -> bool {
    policy.principals.iter().any(|p| principal_matches(p, ctx))
        && policy.resources.iter().any(|p| entry_matches(p, &ctx.resource))
        && policy.actions.iter().any(|p| entry_matches(p, &ctx.action))
}

fn principal_matches(pattern: &str, ctx: &EvaluationContext) -> bool {
    if let Some(role) = pattern.strip_prefix("role:") {
        return ctx.principal_roles.iter().any(|r| r == role) || ctx.principal_groups.iter().any(|g| g == role);
    }
    if let Some(tenant) = pattern.strip_prefix("tenant:") {
        return ctx.tenant_id.as_ref().is_some_and(|t| t.0 == tenant);
    }
    entry_matches(pattern, &ctx.principal)
}

fn entry_matches(pattern: &str, literal: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match globset::Glob::new(pattern) {
        Ok(glob) => glob.compile_matcher().is_match(literal),
        Err(_) => pattern == literal,
    }
}

fn conditions_hold(policy: &Policy, ctx: &EvaluationContext) -> PolicyResult<bool> {
    for condition in &policy.conditions {
        if !condition_holds(policy.id, condition, ctx)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn condition_holds(policy_id: PolicyId, condition: &PolicyCondition, ctx: &EvaluationContext) -> PolicyResult<bool> {
    match condition {
        PolicyCondition::TimeOfDay { start, end } => {
            let parse = |s: &str| {
                NaiveTime::parse_from_str(s, "%H:%M").map_err(|e| PolicyError::MalformedCondition {
                    policy_id: policy_id.to_string(),
                    detail: format!("bad time {s:?}: {e}"),
                })
            };
            let start = parse(start)?;
            let end = parse(end)?;
            let now = ctx.request_time.time();
            Ok(if start <= end {
                now >= start && now <= end
            } else {
                now >= start || now <= end
            })
        }
        PolicyCondition::Weekday { days } => {
            let iso = ctx.request_time.weekday().number_from_monday() as u8;
            Ok(days.contains(&iso))
        }
        PolicyCondition::IpInCidr { cidrs } => {
            let Some(ip) = &ctx.ip else {
                return Ok(false);
            };
            for cidr in cidrs {
                if ip_in_cidr(ip, cidr).map_err(|detail| PolicyError::MalformedCondition {
                    policy_id: policy_id.to_string(),
                    detail,
                })? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        PolicyCondition::Attribute { key, op, value } => {
            let actual = ctx.environment.get(key);
            Ok(attribute_matches(actual, *op, value))
        }
    }
}

fn ip_in_cidr(ip: &str, cidr: &str) -> Result<bool, String> {
    let (network, prefix_len) = cidr
        .split_once('/')
        .ok_or_else(|| format!("malformed cidr {cidr:?}"))?;
    let network: Ipv4Addr = network.parse().map_err(|_| format!("malformed cidr network {network:?}"))?;
    let prefix_len: u32 = prefix_len
        .parse()
        .map_err(|_| format!("malformed cidr prefix {prefix_len:?}"))?;
    if prefix_len > 32 {
        return Err(format!("cidr prefix out of range: {prefix_len}"));
    }
    let ip: Ipv4Addr = ip.parse().map_err(|_| format!("malformed ip {ip:?}"))?;
    let mask = if prefix_len == 0 { 0 } else { u32::MAX << (32 - prefix_len) };
    Ok(u32::from(ip) & mask == u32::from(network) & mask)
}

fn attribute_matches(actual: Option<&serde_json::Value>, op: ConditionOp, expected: &serde_json::Value) -> bool {
    use serde_json::Value;
    match op {
        ConditionOp::Eq => actual == Some(expected),
        ConditionOp::Ne => actual != Some(expected),
        ConditionOp::In => match expected {
            Value::Array(items) => actual.is_some_and(|a| items.contains(a)),
            _ => false,
        },
        ConditionOp::NotIn => match expected {
            Value::Array(items) => !actual.is_some_and(|a| items.contains(a)),
            _ => true,
        },
        ConditionOp::Gt | ConditionOp::Lt | ConditionOp::Gte | ConditionOp::Lte => {
            match (actual.and_then(Value::as_f64), expected.as_f64()) {
                (Some(a), Some(b)) => match op {
                    ConditionOp::Gt => a > b,
                    ConditionOp::Lt => a < b,
                    ConditionOp::Gte => a >= b,
                    ConditionOp::Lte => a <= b,
                    _ => unreachable!(),
                },
                _ => false,
            }
        }
        ConditionOp::Contains => match (actual, expected.as_str()) {
            (Some(Value::String(s)), Some(needle)) => s.contains(needle),
            (Some(Value::Array(items)), _) => items.contains(expected),
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::TenantId;
    use meridian_storage::FileStorage;

    fn ctx(principal: &str, resource: &str, action: &str) -> EvaluationContext {
        EvaluationContext {
            principal: principal.to_string(),
            resource: resource.to_string(),
            action: action.to_string(),
            tenant_id: None,
            principal_roles: vec![],
            principal_groups: vec![],
            ip: None,
            environment: HashMap::new(),
            request_time: chrono::Utc::now(),
        }
    }

    fn allow_policy(id: PolicyId, priority: i32) -> Policy {
        Policy {
            id,
            name: "allow-reads".into(),
            effect: PolicyEffect::Allow,
            principals: vec!["*".into()],
            resources: vec!["doc:*".into()],
            actions: vec!["read".into()],
            priority,
            conditions: vec![],
            tenant_scope: None,
        }
    }

    async fn engine_over(policies: Vec<Policy>) -> AccessPolicyEngine {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileStorage::new(dir.path());
        let store = PolicyStore::open(&backend).await.unwrap();
        for policy in &policies {
            store.put(policy).await.unwrap();
        }
        AccessPolicyEngine::new(store, Duration::from_secs(30)).await.unwrap()
    }

    #[tokio::test]
    async fn default_deny_when_nothing_matches() {
        let engine = engine_over(vec![]).await;
        let decision = engine.evaluate(&ctx("alice", "doc:1", "read")).await;
        assert_eq!(decision.effect, PolicyEffect::Deny);
        assert_eq!(decision.reason, "no matching policy");
    }

    #[tokio::test]
    async fn higher_priority_deny_beats_lower_priority_allow() {
        let mut deny = allow_policy(PolicyId::new(), 10);
        deny.effect = PolicyEffect::Deny;
        deny.name = "deny-override".into();
        let allow = allow_policy(PolicyId::new(), 0);
        let engine = engine_over(vec![allow, deny]).await;

        let decision = engine.evaluate(&ctx("alice", "doc:1", "read")).await;
        assert_eq!(decision.effect, PolicyEffect::Deny);
    }

    #[tokio::test]
    async fn tie_priority_prefers_deny_over_allow() {
        let allow = allow_policy(PolicyId::new(), 5);
        let mut deny = allow_policy(PolicyId::new(), 5);
        deny.effect = PolicyEffect::Deny;
        let engine = engine_over(vec![allow, deny]).await;

        let decision = engine.evaluate(&ctx("alice", "doc:1", "read")).await;
        assert_eq!(decision.effect, PolicyEffect::Deny);
    }

    #[tokio::test]
    async fn repeated_evaluation_is_served_from_cache_and_consistent() {
        let allow = allow_policy(PolicyId::new(), 0);
        let engine = engine_over(vec![allow]).await;
        let c = ctx("alice", "doc:1", "read");
        let first = engine.evaluate(&c).await;
        let second = engine.evaluate(&c).await;
        assert_eq!(first.effect, second.effect);
        assert_eq!(first.matched_policy_id, second.matched_policy_id);
    }

    #[tokio::test]
    async fn mutation_invalidates_the_cache() {
        let engine = engine_over(vec![]).await;
        let c = ctx("alice", "doc:1", "read");
        assert_eq!(engine.evaluate(&c).await.effect, PolicyEffect::Deny);

        engine.put_policy(allow_policy(PolicyId::new(), 0)).await.unwrap();
        assert_eq!(engine.evaluate(&c).await.effect, PolicyEffect::Allow);
    }

    #[tokio::test]
    async fn tenant_scoped_policy_does_not_apply_outside_its_tenant() {
        let mut scoped = allow_policy(PolicyId::new(), 0);
        scoped.tenant_scope = Some(TenantId::new("acme"));
        let engine = engine_over(vec![scoped]).await;

        let decision = engine.evaluate(&ctx("alice", "doc:1", "read")).await;
        assert_eq!(decision.effect, PolicyEffect::Deny);
    }

    #[test]
    fn cidr_matching_respects_prefix_length() {
        assert!(ip_in_cidr("10.1.2.3", "10.0.0.0/8").unwrap());
        assert!(!ip_in_cidr("11.1.2.3", "10.0.0.0/8").unwrap());
    }

    #[test]
    fn malformed_cidr_is_reported_not_panicked_on() {
        assert!(ip_in_cidr("10.1.2.3", "not-a-cidr").is_err());
    }
}
