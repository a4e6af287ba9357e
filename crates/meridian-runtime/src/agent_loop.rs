//! The Agent Runtime tool-use loop (spec §4.H1): drives a session through
//! repeated LLM completions and tool dispatch until the model produces a
//! final text answer, the iteration cap is hit, or the turn deadline
//! elapses.

use crate::error::{RuntimeError, RuntimeResult};
use crate::sandbox::SandboxDriver;
use crate::session_manager::SessionManager;
use meridian_audit::{AuditAction, AuditLog, AuditOutcome};
use meridian_core::{MessageRole, Session, SessionId, ToolDescriptor};
use meridian_events::{Event, EventBus};
use meridian_llm::{
    ChatMessage, CompletionEvent, CompletionRequest, CredentialPool, FailureKind, FinalOutcome, LlmProvider,
    ToolCallRequest,
};
use meridian_policy::{compute_allowed_tools, AccessPolicyEngine, FilterContext};
use meridian_quota::QuotaManager;
use meridian_registry::ToolRegistry;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{instrument, warn};

use crate::handlers::HandlerRegistry;

/// Everything the loop needs to drive one turn, gathered up front so a
/// single `run` call doesn't need a dozen parameters.
pub struct AgentRuntime {
    /// Session lifecycle orchestration.
    pub sessions: Arc<SessionManager>,
    /// Tool descriptors and group expansion.
    pub registry: Arc<ToolRegistry>,
    /// Tool dispatch handlers.
    pub handlers: Arc<HandlerRegistry>,
    /// In-process or sandboxed execution of tool calls.
    pub sandbox: Arc<dyn SandboxDriver>,
    /// ABAC access control.
    pub access_policy: Arc<AccessPolicyEngine>,
    /// Quota and rate-limit enforcement.
    pub quota: Arc<QuotaManager>,
    /// LLM completion backend.
    pub llm: Arc<dyn LlmProvider>,
    /// Provider credentials.
    pub credentials: Arc<CredentialPool>,
    /// Runtime-wide event stream.
    pub events: Arc<EventBus>,
    /// Security audit trail.
    pub audit: Arc<AuditLog>,
    /// Maximum loop iterations per turn.
    pub max_iterations: u32,
    /// Wall-clock deadline for the whole turn.
    pub turn_deadline: Duration,
    /// Per-tool-call sandbox timeout.
    pub tool_timeout: Duration,
    /// Model identifier passed to the LLM Port.
    pub model: String,
}

/// The outcome of a single `run` call.
#[derive(Debug, Clone)]
pub struct AgentResult {
    /// The final assistant text, if the loop converged.
    pub final_text: Option<String>,
    /// Number of loop iterations taken.
    pub iterations: u32,
}

struct DispatchContext<'a> {
    session_id: SessionId,
    tenant_id: Option<meridian_core::TenantId>,
    principal: &'a str,
}

impl AgentRuntime {
    /// Run the tool-use loop for `session`, optionally appending
    /// `new_user_message` first.
    #[instrument(skip(self, new_user_message), fields(session_id = %session.id))]
    pub async fn run(&self, session: &Session, new_user_message: Option<Value>) -> RuntimeResult<AgentResult> {
        let start = Instant::now();

        if let Some(content) = new_user_message {
            self.sessions.append(session.id, MessageRole::User, content, None, None).await?;
        }

        self.events.publish(Event::AgentStarted { session_id: session.id });
        let status_on_error = |status: &str| Event::AgentCompleted {
            session_id: session.id,
            status: status.to_string(),
        };

        let allowed_tools = self.allowed_tools_for(session);
        let tool_descriptors: Vec<ToolDescriptor> = allowed_tools
            .iter()
            .filter_map(|name| self.registry.lookup(name).cloned())
            .collect();

        let dispatch_ctx = DispatchContext {
            session_id: session.id,
            tenant_id: session.tenant_id.clone(),
            principal: &session.owner_principal,
        };

        let mut iterations = 0u32;
        let final_text = loop {
            if start.elapsed() > self.turn_deadline {
                self.events.publish(status_on_error("error"));
                return Err(RuntimeError::Timeout(self.turn_deadline.as_millis() as u64));
            }
            if iterations >= self.max_iterations {
                self.events.publish(status_on_error("iteration_limit"));
                return Err(RuntimeError::IterationLimit(self.max_iterations));
            }
            iterations += 1;

            self.sessions.maybe_compact(session, &*self.llm, &self.model).await?;
            let messages = self.chat_history(session.id).await?;
            let outcome = self.complete_once(messages, tool_descriptors.clone()).await?;

            match outcome {
                FinalOutcome::Text(text) => {
                    self.sessions
                        .append(
                            session.id,
                            MessageRole::Assistant,
                            Value::String(text.clone()),
                            None,
                            None,
                        )
                        .await?;
                    break Some(text);
                }
                FinalOutcome::ToolCalls(calls) => {
                    self.dispatch_tool_calls(&dispatch_ctx, calls).await?;
                }
            }
        };

        self.events.publish(status_on_error("completed"));
        Ok(AgentResult { final_text, iterations })
    }

    fn allowed_tools_for(&self, session: &Session) -> Vec<String> {
        let ctx = FilterContext {
            profile: Some(meridian_core::ToolPolicy {
                profile: "default".to_string(),
                allow: vec!["*".to_string()],
                deny: Vec::new(),
            }),
            subagent: if session.session_type == meridian_core::SessionType::Subagent {
                Some(meridian_core::ToolPolicy {
                    profile: "subagent".to_string(),
                    allow: Vec::new(),
                    deny: vec!["schedule_job".to_string()],
                })
            } else {
                None
            },
            ..Default::default()
        };
        compute_allowed_tools(&ctx, &self.registry)
    }

    async fn chat_history(&self, session_id: SessionId) -> RuntimeResult<Vec<ChatMessage>> {
        let messages = self.sessions.active_messages(session_id).await?;
        Ok(messages.iter().map(to_chat_message).collect())
    }

    /// Run one completion attempt, retrying once with a different credential
    /// on a transient or auth failure (spec §4.Y credential rotation) before
    /// surfacing the provider error.
    async fn complete_once(&self, messages: Vec<ChatMessage>, tools: Vec<ToolDescriptor>) -> RuntimeResult<FinalOutcome> {
        use futures::StreamExt;

        let mut last_err = None;
        for _ in 0..2 {
            let credential = self.credentials.acquire(self.llm.provider_name()).ok();

            let request = CompletionRequest {
                messages: messages.clone(),
                tools: tools.clone(),
                model: self.model.clone(),
                stream: false,
            };

            let mut stream = match self.llm.complete(request).await {
                Ok(s) => s,
                Err(e) => {
                    if let Some(c) = &credential {
                        self.credentials.report_failure(c.id, failure_kind(&e));
                    }
                    last_err = Some(e);
                    continue;
                }
            };

            let mut outcome = None;
            let mut failed = false;
            while let Some(event) = stream.next().await {
                match event {
                    Ok(CompletionEvent::Delta(_)) => {}
                    Ok(CompletionEvent::Final(final_outcome)) => {
                        outcome = Some(final_outcome);
                    }
                    Err(e) => {
                        if let Some(c) = &credential {
                            self.credentials.report_failure(c.id, failure_kind(&e));
                        }
                        last_err = Some(e);
                        failed = true;
                        break;
                    }
                }
            }
            if failed {
                continue;
            }

            if let Some(c) = &credential {
                self.credentials.report_success(c.id);
            }

            return outcome.ok_or_else(|| RuntimeError::Llm("provider stream ended without a final event".to_string()));
        }

        Err(last_err
            .map(RuntimeError::from)
            .unwrap_or_else(|| RuntimeError::NoCredential(self.llm.provider_name().to_string())))
    }

    async fn dispatch_tool_calls(&self, ctx: &DispatchContext<'_>, calls: Vec<ToolCallRequest>) -> RuntimeResult<()> {
        for call in calls {
            self.sessions
                .append(
                    ctx.session_id,
                    MessageRole::ToolCall,
                    call.arguments.clone(),
                    Some(call.name.clone()),
                    Some(call.id.clone()),
                )
                .await?;
            self.events.publish(Event::SessionToolCall {
                session_id: ctx.session_id,
                tool_name: call.name.clone(),
                call_id: call.id.clone(),
            });

            let result = self.dispatch_one(ctx, &call).await;
            let (content, outcome) = match &result {
                Ok(value) => (value.clone(), AuditOutcome::success()),
                Err(e) => (
                    serde_json::json!({ "error": e.to_string() }),
                    AuditOutcome::failure(e.to_string()),
                ),
            };

            self.audit
                .append(
                    Some(ctx.session_id),
                    ctx.tenant_id.clone(),
                    AuditAction::ToolCall {
                        tool: call.name.clone(),
                        call_id: call.id.clone(),
                    },
                    outcome,
                )
                .await
                .map_err(|e| RuntimeError::Storage(e.to_string()))?;

            self.events.publish(Event::SessionToolResult {
                session_id: ctx.session_id,
                call_id: call.id.clone(),
                is_error: result.is_err(),
            });

            self.sessions
                .append(
                    ctx.session_id,
                    MessageRole::ToolResult,
                    content,
                    Some(call.name.clone()),
                    Some(call.id.clone()),
                )
                .await?;
        }
        Ok(())
    }

    async fn dispatch_one(&self, ctx: &DispatchContext<'_>, call: &ToolCallRequest) -> RuntimeResult<Value> {
        let descriptor = self
            .registry
            .lookup(&call.name)
            .ok_or_else(|| RuntimeError::UnknownTool(call.name.clone()))?;

        let decision = self
            .access_policy
            .evaluate(&meridian_core::EvaluationContext {
                principal: ctx.principal.to_string(),
                resource: format!("tool:{}", call.name),
                action: "invoke".to_string(),
                tenant_id: ctx.tenant_id.clone(),
                principal_roles: Vec::new(),
                principal_groups: Vec::new(),
                ip: None,
                environment: HashMap::new(),
                request_time: chrono::Utc::now(),
            })
            .await;
        if decision.effect == meridian_core::PolicyEffect::Deny {
            warn!(tool = %call.name, reason = %decision.reason, "tool call denied by access policy");
            return Err(RuntimeError::AccessDenied(decision.reason));
        }

        if let Some(tenant_id) = &ctx.tenant_id {
            self.quota.check(tenant_id, meridian_core::QuotaKind::Tools).await?;
        }

        let handler = self
            .handlers
            .get(&call.name)
            .ok_or_else(|| RuntimeError::UnknownTool(call.name.clone()))?;

        self.sandbox
            .run(handler.as_ref(), call.arguments.clone(), descriptor.requires_sandbox, self.tool_timeout)
            .await
    }
}

fn failure_kind(err: &meridian_llm::LlmError) -> FailureKind {
    match err {
        meridian_llm::LlmError::AuthInvalid(_) => FailureKind::AuthInvalid,
        _ => FailureKind::Transient,
    }
}

fn to_chat_message(message: &meridian_core::Message) -> ChatMessage {
    let role = match message.role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::System => "system",
        MessageRole::ToolCall => "assistant",
        MessageRole::ToolResult => "tool",
    };
    ChatMessage {
        role: role.to_string(),
        content: message.content.clone(),
        tool_call_id: message.tool_call_id.clone(),
        tool_name: message.tool_name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::HandlerRegistry;
    use crate::sandbox::DispatchingSandbox;
    use meridian_core::{AgentId, SessionKey};
    use meridian_llm::EchoProvider;
    use meridian_policy::AccessPolicyEngine;
    use meridian_storage::{FileStorage, PolicyStore, SessionStore};
    use meridian_workspace::{WorkspaceBoundary, WorkspaceConfig};
    use std::time::Duration as StdDuration;

    async fn runtime() -> (AgentRuntime, Session, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SessionStore::open(dir.path()).await.unwrap());
        let events = Arc::new(EventBus::new(16));
        let sessions = Arc::new(SessionManager::new(store, events.clone(), 1_000_000, 4));
        let key = SessionKey::main(AgentId::new("a1"));
        let session = sessions.route_or_create(key, None, "u1".into(), None).await.unwrap();

        let registry = Arc::new(ToolRegistry::builtin());
        let boundary = WorkspaceBoundary::new(WorkspaceConfig::new(dir.path().to_path_buf()));
        let handlers = Arc::new(HandlerRegistry::builtin(boundary));
        let sandbox: Arc<dyn SandboxDriver> = Arc::new(DispatchingSandbox::new(None));

        let backend = FileStorage::new(dir.path());
        let policy_store = PolicyStore::open(&backend).await.unwrap();
        let access_policy = Arc::new(AccessPolicyEngine::new(policy_store, StdDuration::from_secs(5)).await.unwrap());
        let quota = Arc::new(QuotaManager::new(StdDuration::from_millis(100)));
        let audit = Arc::new(AuditLog::open(dir.path()).await.unwrap());

        let runtime = AgentRuntime {
            sessions,
            registry,
            handlers,
            sandbox,
            access_policy,
            quota,
            llm: Arc::new(EchoProvider),
            credentials: Arc::new(CredentialPool::new()),
            events,
            audit,
            max_iterations: 5,
            turn_deadline: StdDuration::from_secs(5),
            tool_timeout: StdDuration::from_secs(1),
            model: "echo-1".to_string(),
        };
        (runtime, session, dir)
    }

    #[tokio::test]
    async fn converges_to_a_final_text_answer() {
        let (runtime, session, _dir) = runtime().await;
        let result = runtime.run(&session, Some(serde_json::json!("hello"))).await.unwrap();
        assert!(result.final_text.is_some());
        assert_eq!(result.iterations, 1);
    }

    struct FlakyProvider {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl LlmProvider for FlakyProvider {
        async fn complete(&self, request: CompletionRequest) -> meridian_llm::LlmResult<meridian_llm::CompletionStream> {
            if self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                return Err(meridian_llm::LlmError::Transient("connection reset".into()));
            }
            let text = request
                .messages
                .iter()
                .rev()
                .find(|m| m.role == "user")
                .and_then(|m| m.content.as_str())
                .unwrap_or("")
                .to_string();
            let events: Vec<meridian_llm::LlmResult<CompletionEvent>> = vec![Ok(CompletionEvent::Final(FinalOutcome::Text(text)))];
            Ok(Box::pin(futures::stream::iter(events)))
        }

        fn provider_name(&self) -> &str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn retries_once_on_a_transient_failure_before_succeeding() {
        let (mut runtime, session, _dir) = runtime().await;
        runtime.llm = Arc::new(FlakyProvider {
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let result = runtime.run(&session, Some(serde_json::json!("hello"))).await.unwrap();
        assert_eq!(result.final_text.as_deref(), Some("hello"));
    }

    struct AuthFlakyProvider {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl LlmProvider for AuthFlakyProvider {
        async fn complete(&self, request: CompletionRequest) -> meridian_llm::LlmResult<meridian_llm::CompletionStream> {
            if self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                return Err(meridian_llm::LlmError::AuthInvalid("bad key".into()));
            }
            let text = request
                .messages
                .iter()
                .rev()
                .find(|m| m.role == "user")
                .and_then(|m| m.content.as_str())
                .unwrap_or("")
                .to_string();
            let events: Vec<meridian_llm::LlmResult<CompletionEvent>> = vec![Ok(CompletionEvent::Final(FinalOutcome::Text(text)))];
            Ok(Box::pin(futures::stream::iter(events)))
        }

        fn provider_name(&self) -> &str {
            "authflaky"
        }
    }

    #[tokio::test]
    async fn auth_invalid_evicts_the_credential_permanently() {
        let (mut runtime, session, _dir) = runtime().await;
        runtime.llm = Arc::new(AuthFlakyProvider {
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        runtime.credentials.add(meridian_core::Credential {
            id: meridian_core::CredentialId::new(),
            provider: "authflaky".to_string(),
            secret: "bad-key".to_string(),
            priority: 0,
            cooldown_until: None,
            error_count: 0,
            last_used_at: None,
        });

        let result = runtime.run(&session, Some(serde_json::json!("hello"))).await.unwrap();
        assert_eq!(result.final_text.as_deref(), Some("hello"));
        assert!(
            runtime.credentials.acquire("authflaky").is_err(),
            "an AuthInvalid failure should evict the credential rather than cool it down"
        );
    }

    #[tokio::test]
    async fn unknown_tool_name_is_rejected() {
        let (runtime, session, _dir) = runtime().await;
        let call = ToolCallRequest {
            id: "c1".into(),
            name: "does_not_exist".into(),
            arguments: serde_json::json!({}),
        };
        let ctx = DispatchContext {
            session_id: session.id,
            tenant_id: None,
            principal: "u1",
        };
        let err = runtime.dispatch_one(&ctx, &call).await.unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownTool(_)));
    }
}
