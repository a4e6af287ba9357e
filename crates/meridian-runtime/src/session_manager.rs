//! The Session Manager (spec §4.M4): create/route by canonical session key,
//! gap-free serialized appends, compaction, subagent spawn, and idle
//! archival — a thin orchestration layer over [`meridian_storage::SessionStore`].

use crate::compaction::{merge_summaries, plan_compaction, summarize_chunk};
use crate::error::{RuntimeError, RuntimeResult};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use meridian_core::{
    Message, MessageRole, Session, SessionId, SessionKey, SessionStatus, TenantId, ToolCallMessageId,
};
use meridian_events::{Event, EventBus};
use meridian_llm::LlmProvider;
use meridian_storage::{NewSession, SessionFilter, SessionStore};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument};

/// A lightweight, per-session_key mutex so concurrent "route or create"
/// calls for the same key race on a lock instead of the filesystem,
/// satisfying spec's "one winner, others observe it" conflict rule.
#[derive(Default)]
struct RouteLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl RouteLocks {
    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}

/// Orchestrates session lifecycle on top of the durable [`SessionStore`].
pub struct SessionManager {
    store: Arc<SessionStore>,
    events: Arc<EventBus>,
    route_locks: RouteLocks,
    compaction_soft_token_limit: u64,
    compaction_tail_keep: usize,
}

/// Estimate a message's token cost. Roughly four characters per token, the
/// same crude heuristic used for `token_count` bookkeeping throughout the
/// reference pack's comparable runtimes, pending a real tokenizer.
#[must_use]
pub fn estimate_tokens(content: &Value) -> u32 {
    let text = match content {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    ((text.chars().count() as u32) / 4).max(1)
}

impl SessionManager {
    /// Build a manager over `store`, publishing lifecycle events to `events`.
    #[must_use]
    pub fn new(store: Arc<SessionStore>, events: Arc<EventBus>, compaction_soft_token_limit: u64, compaction_tail_keep: usize) -> Self {
        Self {
            store,
            events,
            route_locks: RouteLocks::default(),
            compaction_soft_token_limit,
            compaction_tail_keep,
        }
    }

    /// Resolve `key` to an existing session, or create one. Concurrent
    /// callers for the same key serialize on an in-process lock so exactly
    /// one creates the session; the rest observe the winner.
    #[instrument(skip(self))]
    pub async fn route_or_create(
        &self,
        key: SessionKey,
        tenant_id: Option<TenantId>,
        owner_principal: String,
        channel_id: Option<String>,
    ) -> RuntimeResult<Session> {
        let lock = self.route_locks.lock_for(&key.to_string());
        let _guard = lock.lock().await;

        if let Some(existing) = self.store.find_by_key(&key).await? {
            return Ok(existing);
        }

        let session_type = key.session_type();
        let session = self
            .store
            .create_session(NewSession {
                key,
                session_type,
                tenant_id,
                owner_principal,
                channel_id,
                parent_id: None,
                depth: 0,
            })
            .await?;
        info!(session_id = %session.id, "created session");
        Ok(session)
    }

    /// Spawn a subagent session under `parent`. Rejects depths beyond
    /// [`Session::MAX_DEPTH`].
    pub async fn spawn_subagent(&self, parent: &Session, subagent_id: impl Into<String>) -> RuntimeResult<Session> {
        let depth = parent.depth + 1;
        if depth > Session::MAX_DEPTH {
            return Err(RuntimeError::DepthExceeded {
                max: Session::MAX_DEPTH,
                attempted: depth,
            });
        }
        let key = SessionKey::subagent(parent.key.agent_id().clone(), subagent_id);
        let session = self
            .store
            .create_session(NewSession {
                key,
                session_type: meridian_core::SessionType::Subagent,
                tenant_id: parent.tenant_id.clone(),
                owner_principal: parent.owner_principal.clone(),
                channel_id: parent.channel_id.clone(),
                parent_id: Some(parent.id),
                depth,
            })
            .await?;
        info!(session_id = %session.id, parent_id = %parent.id, depth, "spawned subagent session");
        Ok(session)
    }

    /// Append a message, assigning its `seq` and publishing
    /// [`Event::SessionMessage`].
    pub async fn append(
        &self,
        session_id: SessionId,
        role: MessageRole,
        content: Value,
        tool_name: Option<String>,
        tool_call_id: Option<String>,
    ) -> RuntimeResult<Message> {
        let token_estimate = estimate_tokens(&content);
        let message = Message {
            id: ToolCallMessageId::new(),
            session_id,
            seq: 0,
            role,
            content,
            created_at: Utc::now(),
            token_estimate,
            tool_name,
            tool_call_id,
            superseded: false,
            metadata: HashMap::new(),
        };
        let appended = self.store.append_message(session_id, message).await?;
        self.events.publish(Event::SessionMessage {
            session_id,
            seq: appended.seq,
            role: role_name(appended.role).to_string(),
        });
        Ok(appended)
    }

    /// The session's currently active (not logically superseded) history,
    /// in `seq` order: everything after the highest `covers_up_to_seq`
    /// recorded by a prior compaction summary, plus the summaries
    /// themselves. Physical records are never mutated; superseding is
    /// computed from summary metadata instead.
    pub async fn active_messages(&self, session_id: SessionId) -> RuntimeResult<Vec<Message>> {
        let all = self.store.load_messages(session_id, None, None).await?;
        let covered_up_to = all
            .iter()
            .filter_map(|m| m.metadata.get("covers_up_to_seq").and_then(Value::as_u64))
            .max()
            .unwrap_or(0);

        Ok(all
            .into_iter()
            .filter(|m| m.seq > covered_up_to || is_summary(m))
            .collect())
    }

    /// Trigger a compaction pass if `session`'s running token count exceeds
    /// the configured soft limit. No-op (returns `None`) if the session is
    /// under the limit or too short to compact anything.
    pub async fn maybe_compact(
        &self,
        session: &Session,
        provider: &dyn LlmProvider,
        model: &str,
    ) -> RuntimeResult<Option<Message>> {
        if session.token_count < self.compaction_soft_token_limit {
            return Ok(None);
        }

        let active = self.active_messages(session.id).await?;
        let Some(chunks) = plan_compaction(&active, self.compaction_tail_keep) else {
            return Ok(None);
        };

        let mut summaries = Vec::with_capacity(chunks.len());
        let mut covers_up_to_seq = 0u64;
        let mut compacted_count = 0usize;
        for chunk in &chunks {
            let summary = summarize_chunk(provider, model, chunk).await?;
            summaries.push(summary);
            covers_up_to_seq = covers_up_to_seq.max(chunk.iter().map(|m| m.seq).max().unwrap_or(0));
            compacted_count += chunk.len();
        }
        let merged = merge_summaries(&summaries);

        let mut metadata = HashMap::new();
        metadata.insert("summary".to_string(), Value::Bool(true));
        metadata.insert("covers_up_to_seq".to_string(), Value::from(covers_up_to_seq));

        let message = Message {
            id: ToolCallMessageId::new(),
            session_id: session.id,
            seq: 0,
            role: MessageRole::System,
            content: Value::String(merged),
            created_at: Utc::now(),
            token_estimate: estimate_tokens(&Value::String(String::new())),
            tool_name: None,
            tool_call_id: None,
            superseded: false,
            metadata,
        };
        let appended = self.store.append_message(session.id, message).await?;
        self.events.publish(Event::SessionCompacted {
            session_id: session.id,
            compacted_count,
        });
        info!(session_id = %session.id, compacted_count, "compacted session history");
        Ok(Some(appended))
    }

    /// Archive every active session whose `updated_at` is older than
    /// `idle_after`. Returns the archived session ids.
    pub async fn archive_idle(&self, idle_after: ChronoDuration) -> RuntimeResult<Vec<SessionId>> {
        let cutoff: DateTime<Utc> = Utc::now() - idle_after;
        let sessions = self
            .store
            .list(SessionFilter {
                tenant_id: None,
                status: Some(SessionStatus::Active),
            })
            .await?;

        let mut archived = Vec::new();
        for session in sessions {
            if session.updated_at < cutoff {
                self.store.archive(session.id).await?;
                archived.push(session.id);
            }
        }
        Ok(archived)
    }
}

fn is_summary(message: &Message) -> bool {
    message.metadata.get("summary").and_then(Value::as_bool).unwrap_or(false)
}

fn role_name(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::System => "system",
        MessageRole::ToolCall => "tool_call",
        MessageRole::ToolResult => "tool_result",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::AgentId;
    use meridian_llm::EchoProvider;

    async fn manager() -> (SessionManager, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SessionStore::open(dir.path()).await.unwrap());
        let events = Arc::new(EventBus::new(16));
        (SessionManager::new(store, events, 1_000_000, 4), dir)
    }

    #[tokio::test]
    async fn route_or_create_is_idempotent_for_the_same_key() {
        let (manager, _dir) = manager().await;
        let key = SessionKey::main(AgentId::new("a1"));
        let first = manager.route_or_create(key.clone(), None, "u1".into(), None).await.unwrap();
        let second = manager.route_or_create(key, None, "u1".into(), None).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn spawn_subagent_rejects_depth_beyond_maximum() {
        let (manager, _dir) = manager().await;
        let key = SessionKey::main(AgentId::new("a1"));
        let mut session = manager.route_or_create(key, None, "u1".into(), None).await.unwrap();
        session.depth = Session::MAX_DEPTH;
        let err = manager.spawn_subagent(&session, "sub1").await.unwrap_err();
        assert!(matches!(err, RuntimeError::DepthExceeded { .. }));
    }

    #[tokio::test]
    async fn append_assigns_gap_free_seq_and_publishes_an_event() {
        let (manager, _dir) = manager().await;
        let key = SessionKey::main(AgentId::new("a1"));
        let session = manager.route_or_create(key, None, "u1".into(), None).await.unwrap();

        let mut sub = manager.events.subscribe("session.message", Some(session.id));
        let message = manager
            .append(session.id, MessageRole::User, serde_json::json!("hi"), None, None)
            .await
            .unwrap();
        assert_eq!(message.seq, 1);
        let event = sub.recv().await.unwrap();
        assert!(matches!(event, Event::SessionMessage { seq: 1, .. }));
    }

    #[tokio::test]
    async fn maybe_compact_is_a_noop_under_the_soft_limit() {
        let (manager, _dir) = manager().await;
        let key = SessionKey::main(AgentId::new("a1"));
        let session = manager.route_or_create(key, None, "u1".into(), None).await.unwrap();
        let provider = EchoProvider;
        let result = manager.maybe_compact(&session, &provider, "echo-1").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn maybe_compact_summarizes_once_over_the_soft_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SessionStore::open(dir.path()).await.unwrap());
        let events = Arc::new(EventBus::new(16));
        let manager = SessionManager::new(store, events, 10, 4);

        let key = SessionKey::main(AgentId::new("a1"));
        let mut session = manager.route_or_create(key, None, "u1".into(), None).await.unwrap();
        for i in 0..50 {
            manager
                .append(session.id, MessageRole::User, serde_json::json!(format!("message {i}")), None, None)
                .await
                .unwrap();
        }
        session.token_count = 1_000;

        let provider = EchoProvider;
        let summary = manager.maybe_compact(&session, &provider, "echo-1").await.unwrap();
        assert!(summary.is_some());

        let active = manager.active_messages(session.id).await.unwrap();
        assert!(active.len() < 50, "active history should have shrunk after compaction");
    }

    #[tokio::test]
    async fn archive_idle_tombstones_sessions_past_the_cutoff() {
        let (manager, _dir) = manager().await;
        let key = SessionKey::main(AgentId::new("a1"));
        let session = manager.route_or_create(key, None, "u1".into(), None).await.unwrap();

        let archived = manager.archive_idle(ChronoDuration::seconds(-1)).await.unwrap();
        assert_eq!(archived, vec![session.id]);
    }
}
