//! The method registry (spec §4.T): every `request.method` the Gateway
//! understands, and the dispatch logic behind each.

use crate::error::{GatewayError, GatewayResult};
use crate::state::AppState;
use meridian_core::{Job, Policy, SessionId, Tenant, TenantId};
use meridian_storage::SessionFilter;
use serde_json::Value;
use std::collections::HashSet;

/// The full set of method names this Gateway advertises in `hello_ok`.
pub const METHOD_NAMES: &[&str] = &[
    "sessions.list",
    "sessions.history",
    "sessions.post_message",
    "agents.list",
    "jobs.list",
    "jobs.put",
    "jobs.delete",
    "tenants.list",
    "tenants.put",
    "tenants.delete",
    "policies.list",
    "policies.put",
    "policies.delete",
    "tools.list",
];

fn bad_params(detail: impl Into<String>) -> GatewayError {
    GatewayError::InvalidRequest(detail.into())
}

/// Dispatch one `request` frame's method + params to its handler.
///
/// `principal` is the authenticated identity bound to the connection (from
/// `hello.auth`); `tenant_id` is its tenant binding, if any.
pub async fn dispatch(
    state: &AppState,
    principal: &str,
    tenant_id: Option<&TenantId>,
    method: &str,
    params: Value,
) -> GatewayResult<Value> {
    match method {
        "sessions.list" => sessions_list(state, tenant_id).await,
        "sessions.history" => sessions_history(state, params).await,
        "sessions.post_message" => sessions_post_message(state, principal, tenant_id, params).await,
        "agents.list" => agents_list(state, tenant_id).await,
        "jobs.list" => jobs_list(state).await,
        "jobs.put" => jobs_put(state, params).await,
        "jobs.delete" => jobs_delete(state, params).await,
        "tenants.list" => tenants_list(state).await,
        "tenants.put" => tenants_put(state, params).await,
        "tenants.delete" => tenants_delete(state, params).await,
        "policies.list" => policies_list(state).await,
        "policies.put" => policies_put(state, params).await,
        "policies.delete" => policies_delete(state, params).await,
        "tools.list" => tools_list(state).await,
        other => Err(GatewayError::MethodNotFound(other.to_string())),
    }
}

async fn sessions_list(state: &AppState, tenant_id: Option<&TenantId>) -> GatewayResult<Value> {
    let filter = SessionFilter {
        tenant_id: tenant_id.cloned(),
        status: None,
    };
    let sessions = state.sessions.list(filter).await.map_err(meridian_core::MeridianError::from)?;
    Ok(serde_json::to_value(sessions).expect("Session serializes"))
}

async fn sessions_history(state: &AppState, params: Value) -> GatewayResult<Value> {
    let session_id: SessionId = params
        .get("session_id")
        .and_then(Value::as_str)
        .ok_or_else(|| bad_params("missing session_id"))?
        .parse()
        .map_err(|_| bad_params("session_id is not a valid id"))?;
    let from_seq = params.get("from_seq").and_then(Value::as_u64);
    let limit = params.get("limit").and_then(Value::as_u64).map(|n| n as usize);
    let messages = state
        .sessions
        .load_messages(session_id, from_seq, limit)
        .await
        .map_err(meridian_core::MeridianError::from)?;
    Ok(serde_json::to_value(messages).expect("Message serializes"))
}

async fn sessions_post_message(
    state: &AppState,
    principal: &str,
    tenant_id: Option<&TenantId>,
    params: Value,
) -> GatewayResult<Value> {
    let session_id: SessionId = params
        .get("session_id")
        .and_then(Value::as_str)
        .ok_or_else(|| bad_params("missing session_id"))?
        .parse()
        .map_err(|_| bad_params("session_id is not a valid id"))?;
    let content = params.get("content").cloned().ok_or_else(|| bad_params("missing content"))?;

    if let Some(tenant_id) = tenant_id {
        state
            .quota
            .check(tenant_id, meridian_core::QuotaKind::MessagesPerSession)
            .await
            .map_err(meridian_core::MeridianError::from)?;
    }

    let session = state
        .sessions
        .load_session(session_id)
        .await
        .map_err(meridian_core::MeridianError::from)?;

    let agent = state.agent.clone();
    let principal = principal.to_string();
    tracing::info!(session_id = %session_id, %principal, "dispatching agent turn for posted message");
    tokio::spawn(async move {
        if let Err(err) = agent.run(&session, Some(content)).await {
            tracing::warn!(session_id = %session_id, error = %err, "agent turn failed");
        }
    });

    Ok(serde_json::json!({ "accepted": true, "session_id": session_id }))
}

async fn agents_list(state: &AppState, tenant_id: Option<&TenantId>) -> GatewayResult<Value> {
    let filter = SessionFilter {
        tenant_id: tenant_id.cloned(),
        status: None,
    };
    let sessions = state.sessions.list(filter).await.map_err(meridian_core::MeridianError::from)?;
    let agent_ids: HashSet<String> = sessions.iter().map(|s| s.key.agent_id().to_string()).collect();
    let mut agent_ids: Vec<String> = agent_ids.into_iter().collect();
    agent_ids.sort();
    Ok(serde_json::json!({ "agent_ids": agent_ids }))
}

async fn jobs_list(state: &AppState) -> GatewayResult<Value> {
    let jobs = state.jobs.list().await.map_err(meridian_core::MeridianError::from)?;
    Ok(serde_json::to_value(jobs).expect("Job serializes"))
}

async fn jobs_put(state: &AppState, params: Value) -> GatewayResult<Value> {
    let job: Job = serde_json::from_value(params).map_err(|e| bad_params(e.to_string()))?;
    state.jobs.put(&job).await.map_err(meridian_core::MeridianError::from)?;
    Ok(serde_json::json!({ "id": job.id }))
}

async fn jobs_delete(state: &AppState, params: Value) -> GatewayResult<Value> {
    let id = params
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| bad_params("missing id"))?
        .parse()
        .map_err(|_| bad_params("id is not a valid job id"))?;
    state.jobs.delete(&id).await.map_err(meridian_core::MeridianError::from)?;
    Ok(Value::Null)
}

async fn tenants_list(state: &AppState) -> GatewayResult<Value> {
    let tenants = state.tenants.list().await.map_err(meridian_core::MeridianError::from)?;
    Ok(serde_json::to_value(tenants).expect("Tenant serializes"))
}

async fn tenants_put(state: &AppState, params: Value) -> GatewayResult<Value> {
    let tenant: Tenant = serde_json::from_value(params).map_err(|e| bad_params(e.to_string()))?;
    state.quota.configure_tenant(tenant.id.clone(), tenant.quota.clone());
    state.tenants.put(&tenant).await.map_err(meridian_core::MeridianError::from)?;
    Ok(serde_json::json!({ "id": tenant.id }))
}

async fn tenants_delete(state: &AppState, params: Value) -> GatewayResult<Value> {
    let id = TenantId::new(
        params
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| bad_params("missing id"))?,
    );
    state.tenants.delete(&id).await.map_err(meridian_core::MeridianError::from)?;
    Ok(Value::Null)
}

async fn policies_list(state: &AppState) -> GatewayResult<Value> {
    let policies = state.policies.list().await.map_err(meridian_core::MeridianError::from)?;
    Ok(serde_json::to_value(policies).expect("Policy serializes"))
}

async fn policies_put(state: &AppState, params: Value) -> GatewayResult<Value> {
    let policy: Policy = serde_json::from_value(params).map_err(|e| bad_params(e.to_string()))?;
    state.access_policy.put_policy(policy.clone()).await.map_err(meridian_core::MeridianError::from)?;
    Ok(serde_json::json!({ "id": policy.id }))
}

async fn policies_delete(state: &AppState, params: Value) -> GatewayResult<Value> {
    let id = params
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| bad_params("missing id"))?
        .parse()
        .map_err(|_| bad_params("id is not a valid policy id"))?;
    state.access_policy.delete_policy(&id).await.map_err(meridian_core::MeridianError::from)?;
    Ok(Value::Null)
}

async fn tools_list(state: &AppState) -> GatewayResult<Value> {
    let tools: Vec<_> = state.registry.describe_all().cloned().collect();
    Ok(serde_json::to_value(tools).expect("ToolDescriptor serializes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_names_include_every_required_family() {
        let families = ["sessions.", "agents.", "jobs.", "tenants.", "policies.", "tools."];
        for family in families {
            assert!(METHOD_NAMES.iter().any(|m| m.starts_with(family)), "missing {family} methods");
        }
    }

    #[test]
    fn unknown_method_reports_method_not_found() {
        let err = GatewayError::MethodNotFound("nope".to_string());
        assert_eq!(err.wire_code(), meridian_core::WireErrorCode::MethodNotFound);
    }
}
