//! Shared services every Gateway connection dispatches `request` frames
//! against.

use meridian_events::EventBus;
use meridian_policy::AccessPolicyEngine;
use meridian_quota::QuotaManager;
use meridian_registry::ToolRegistry;
use meridian_runtime::AgentRuntime;
use meridian_storage::{JobStore, PolicyStore, SessionStore, TenantStore};
use std::sync::Arc;

/// Everything a method handler needs, cloned cheaply (all fields are
/// `Arc`-backed) into every connection task.
#[derive(Clone)]
pub struct AppState {
    /// Session metadata and message log storage.
    pub sessions: Arc<SessionStore>,
    /// Tenant records (admin `tenants.*` methods).
    pub tenants: Arc<TenantStore>,
    /// Access policy records (admin `policies.*` methods).
    pub policies: Arc<PolicyStore>,
    /// Scheduled job records (`jobs.*` methods).
    pub jobs: Arc<JobStore>,
    /// Tool descriptors (`tools.list`).
    pub registry: Arc<ToolRegistry>,
    /// Runs agent turns triggered by `sessions.post_message`.
    pub agent: Arc<AgentRuntime>,
    /// Evaluates and caches access decisions for admin methods.
    pub access_policy: Arc<AccessPolicyEngine>,
    /// Per-tenant quota and rate-limit bookkeeping.
    pub quota: Arc<QuotaManager>,
    /// The bus every connection's event stream subscribes against.
    pub events: Arc<EventBus>,
    /// Bound on a connection's outbound frame queue before it is closed
    /// with `UNAVAILABLE` (spec §4.T).
    pub outbound_queue_max: usize,
    /// Lowest protocol version this server will negotiate.
    pub protocol_min: u32,
    /// Highest protocol version this server will negotiate.
    pub protocol_max: u32,
}
