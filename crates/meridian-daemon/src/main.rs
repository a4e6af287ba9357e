//! `meridiand` — the Meridian Gateway daemon binary: loads configuration,
//! opens the Storage Port, wires the Policy/Quota/Registry engines and the
//! Agent Runtime, starts the Autonomous Scheduler, and serves the Gateway.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use meridian_audit::AuditLog;
use meridian_config::{load_layered, Config};
use meridian_core::Credential;
use meridian_events::EventBus;
use meridian_gateway::{serve, AppState};
use meridian_llm::{CredentialPool, EchoProvider, LlmProvider, OpenAiCompatProvider};
use meridian_policy::AccessPolicyEngine;
use meridian_quota::QuotaManager;
use meridian_registry::ToolRegistry;
use meridian_runtime::{AgentRuntime, DispatchingSandbox, HandlerRegistry, SandboxDriver, SessionManager};
use meridian_scheduler::Scheduler;
use meridian_storage::{FileStorage, JobStore, PolicyStore, SessionStore, TenantStore};
use meridian_telemetry::{setup_logging, LogConfig, LogFormat};
use meridian_workspace::{WorkspaceBoundary, WorkspaceConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logging(&LogConfig::new("info").with_format(LogFormat::Compact))
        .unwrap_or_else(|e| eprintln!("logging already initialized: {e}"));

    let system_config = PathBuf::from("/etc/meridian/config.toml");
    let workspace_config = std::env::current_dir()?.join("meridian.toml");
    let config = load_layered(
        system_config.exists().then_some(system_config.as_path()),
        workspace_config.exists().then_some(workspace_config.as_path()),
        None,
    )?;

    info!(data_root = %config.data_root.display(), bind = %config.gateway_bind, "starting meridian daemon");

    let state = build_state(&config).await?;
    let scheduler = build_scheduler(&config, &state).await?;

    tokio::spawn(async move {
        scheduler.run_forever().await;
    });

    let bind_addr = config.gateway_bind.parse()?;
    serve(bind_addr, state).await?;
    Ok(())
}

async fn build_state(config: &Config) -> anyhow::Result<AppState> {
    std::fs::create_dir_all(&config.data_root)?;
    let backend = FileStorage::new(&config.data_root);

    let sessions = Arc::new(SessionStore::open(&config.data_root).await?);
    let tenants = Arc::new(TenantStore::open(&backend).await?);
    let policy_store_for_engine = PolicyStore::open(&backend).await?;
    let policies = Arc::new(PolicyStore::open(&backend).await?);
    let jobs = Arc::new(JobStore::open(&backend).await?);

    let registry = Arc::new(ToolRegistry::builtin());
    let events = Arc::new(EventBus::new(config.event_bus_subscriber_queue_max));
    let access_policy = Arc::new(AccessPolicyEngine::new(policy_store_for_engine, Duration::from_secs(config.policy_cache_ttl_s)).await?);
    let quota = Arc::new(QuotaManager::new(Duration::from_secs(1)));
    // Per-tenant quotas are configured from `config.quota_defaults_per_tier`
    // when a tenant is created via `tenants.put`, not at startup: no tenants
    // exist yet here.

    let session_manager = Arc::new(SessionManager::new(
        sessions.clone(),
        events.clone(),
        config.compaction_soft_token_limit,
        config.compaction_tail_keep,
    ));

    let boundary = WorkspaceBoundary::new(WorkspaceConfig::new(config.data_root.join("workspace")));
    let handlers = Arc::new(HandlerRegistry::builtin(boundary));
    let sandbox: Arc<dyn SandboxDriver> = Arc::new(DispatchingSandbox::new(None));

    let credentials = Arc::new(CredentialPool::new());
    if let Ok(api_key) = std::env::var("MERIDIAN_LLM_API_KEY") {
        credentials.add(Credential {
            id: meridian_core::CredentialId::new(),
            provider: config.default_llm_provider.clone(),
            secret: api_key,
            priority: 0,
            cooldown_until: None,
            error_count: 0,
            last_used_at: None,
        });
    }

    let llm: Arc<dyn LlmProvider> = match config.default_llm_provider.as_str() {
        "echo" => Arc::new(EchoProvider),
        base_url => Arc::new(OpenAiCompatProvider::new(base_url.to_string(), std::env::var("MERIDIAN_LLM_API_KEY").ok())),
    };

    let audit = Arc::new(AuditLog::open(&config.data_root).await?);

    let agent = Arc::new(AgentRuntime {
        sessions: session_manager,
        registry: registry.clone(),
        handlers,
        sandbox,
        access_policy: access_policy.clone(),
        quota: quota.clone(),
        llm,
        credentials,
        events: events.clone(),
        audit,
        max_iterations: config.agent_max_iterations,
        turn_deadline: Duration::from_secs(config.request_deadline_s),
        tool_timeout: Duration::from_secs(config.sandbox_timeout_s),
        model: config.default_model.clone(),
    });

    Ok(AppState {
        sessions,
        tenants,
        policies,
        jobs,
        registry,
        agent,
        access_policy,
        quota,
        events,
        outbound_queue_max: 256,
        protocol_min: config.gateway_protocol_min,
        protocol_max: config.gateway_protocol_max,
    })
}

async fn build_scheduler(config: &Config, state: &AppState) -> anyhow::Result<Scheduler> {
    let backend = FileStorage::new(&config.data_root);
    let jobs = Arc::new(JobStore::open(&backend).await?);
    Ok(Scheduler::new(
        jobs,
        state.events.clone(),
        state.agent.clone(),
        Duration::from_millis(config.scheduler_poll_interval_ms),
    ))
}
