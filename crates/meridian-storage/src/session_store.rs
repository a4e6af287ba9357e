//! The Session Store (spec §4.L2): append-only session/message persistence
//! with gap-free per-session `seq` and crash-safe appends.

use crate::error::{StorageError, StorageResult};
use chrono::Utc;
use dashmap::DashMap;
use meridian_core::{Message, Session, SessionId, SessionKey, SessionStatus, SessionType, TenantId};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Fields needed to create a brand-new session.
pub struct NewSession {
    /// Canonical session key.
    pub key: SessionKey,
    /// Session type (normally derived from `key`).
    pub session_type: SessionType,
    /// Owning tenant, if any.
    pub tenant_id: Option<TenantId>,
    /// The principal that opened the session.
    pub owner_principal: String,
    /// Originating channel, if any.
    pub channel_id: Option<String>,
    /// Parent session, for subagents.
    pub parent_id: Option<SessionId>,
    /// Nesting depth; must be `parent depth + 1` when `parent_id` is set.
    pub depth: u8,
}

/// Optional filter for [`SessionStore::list`].
#[derive(Default)]
pub struct SessionFilter {
    /// Restrict to sessions owned by this tenant.
    pub tenant_id: Option<TenantId>,
    /// Restrict to sessions in this status.
    pub status: Option<SessionStatus>,
}

struct SessionIndex {
    last_seq: u64,
}

/// Filesystem-backed session store: `sessions/{id}.log` + `{id}.meta`.
pub struct SessionStore {
    root: PathBuf,
    write_locks: DashMap<SessionId, Arc<Mutex<SessionIndex>>>,
}

impl SessionStore {
    /// Open (creating if necessary) the `sessions/` directory under `data_root`.
    pub async fn open(data_root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = data_root.into().join("sessions");
        fs::create_dir_all(&root).await.map_err(|e| StorageError::Io {
            path: root.display().to_string(),
            source: e,
        })?;
        Ok(Self {
            root,
            write_locks: DashMap::new(),
        })
    }

    fn log_path(&self, id: SessionId) -> PathBuf {
        self.root.join(format!("{id}.log"))
    }

    fn meta_path(&self, id: SessionId) -> PathBuf {
        self.root.join(format!("{id}.meta"))
    }

    /// Create a new session. Depth must not exceed [`Session::MAX_DEPTH`].
    pub async fn create_session(&self, spec: NewSession) -> StorageResult<Session> {
        if spec.depth > Session::MAX_DEPTH {
            return Err(StorageError::InvalidKey(format!(
                "depth {} exceeds maximum {}",
                spec.depth,
                Session::MAX_DEPTH
            )));
        }
        let session = Session {
            id: SessionId::new(),
            key: spec.key,
            session_type: spec.session_type,
            tenant_id: spec.tenant_id,
            owner_principal: spec.owner_principal,
            channel_id: spec.channel_id,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            parent_id: spec.parent_id,
            depth: spec.depth,
            status: SessionStatus::Active,
            token_count: 0,
            metadata: HashMap::new(),
        };
        self.persist_meta(&session).await?;
        // Touch the log file so `load_messages` on a fresh session sees an
        // empty, not missing, history.
        fs::File::create(self.log_path(session.id))
            .await
            .map_err(|e| StorageError::Io {
                path: self.log_path(session.id).display().to_string(),
                source: e,
            })?;
        self.write_locks
            .insert(session.id, Arc::new(Mutex::new(SessionIndex { last_seq: 0 })));
        Ok(session)
    }

    async fn persist_meta(&self, session: &Session) -> StorageResult<()> {
        let path = self.meta_path(session.id);
        let bytes = serde_json::to_vec(session).map_err(|e| StorageError::Serialization(e.to_string()))?;
        let mut file = fs::File::create(&path).await.map_err(|e| StorageError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        file.write_all(&bytes).await.map_err(|e| StorageError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        file.sync_all().await.map_err(|e| StorageError::Io {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Load a session's metadata record by id.
    pub async fn load_session(&self, id: SessionId) -> StorageResult<Session> {
        let path = self.meta_path(id);
        let bytes = fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(id.to_string())
            } else {
                StorageError::Io {
                    path: path.display().to_string(),
                    source: e,
                }
            }
        })?;
        serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    async fn lock_for(&self, id: SessionId) -> StorageResult<Arc<Mutex<SessionIndex>>> {
        if let Some(existing) = self.write_locks.get(&id) {
            return Ok(existing.clone());
        }
        // Recover last_seq from the log tail (process restart case).
        let last_seq = self.recover_last_seq(id).await?;
        let lock = Arc::new(Mutex::new(SessionIndex { last_seq }));
        self.write_locks.insert(id, lock.clone());
        Ok(lock)
    }

    async fn recover_last_seq(&self, id: SessionId) -> StorageResult<u64> {
        let path = self.log_path(id);
        let contents = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(StorageError::Io {
                    path: path.display().to_string(),
                    source: e,
                })
            }
        };
        let last_seq = contents
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .map(|line| {
                serde_json::from_str::<Message>(line)
                    .map(|m| m.seq)
                    .map_err(|e| StorageError::Serialization(e.to_string()))
            })
            .transpose()?
            .unwrap_or(0);
        Ok(last_seq)
    }

    /// Append `message` to `session_id`'s log, assigning the next gap-free
    /// `seq` atomically. Crash-safe: the write is `fsync`'d before returning.
    pub async fn append_message(&self, session_id: SessionId, mut message: Message) -> StorageResult<Message> {
        let lock = self.lock_for(session_id).await?;
        let mut index = lock.lock().await;

        let expected = index.last_seq + 1;
        if message.seq != 0 && message.seq != expected {
            return Err(StorageError::NonMonotonicSeq {
                session_id: session_id.to_string(),
                expected,
                actual: message.seq,
            });
        }
        message.seq = expected;
        message.session_id = session_id;

        let path = self.log_path(session_id);
        let line = serde_json::to_string(&message).map_err(|e| StorageError::Serialization(e.to_string()))?;
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StorageError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
        file.write_all(line.as_bytes()).await.map_err(|e| StorageError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        file.write_all(b"\n").await.map_err(|e| StorageError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        file.sync_all().await.map_err(|e| StorageError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        index.last_seq = expected;
        drop(index);

        let mut session = self.load_session(session_id).await?;
        session.updated_at = Utc::now();
        session.token_count += u64::from(message.token_estimate);
        self.persist_meta(&session).await?;

        Ok(message)
    }

    /// Load messages in `seq` order, optionally starting after `from_seq`
    /// and limited to `limit` records.
    pub async fn load_messages(
        &self,
        session_id: SessionId,
        from_seq: Option<u64>,
        limit: Option<usize>,
    ) -> StorageResult<Vec<Message>> {
        let path = self.log_path(session_id);
        let contents = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(session_id.to_string()))
            }
            Err(e) => {
                return Err(StorageError::Io {
                    path: path.display().to_string(),
                    source: e,
                })
            }
        };
        let mut messages = Vec::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let message: Message =
                serde_json::from_str(line).map_err(|e| StorageError::Serialization(e.to_string()))?;
            if let Some(from) = from_seq {
                if message.seq <= from {
                    continue;
                }
            }
            messages.push(message);
            if let Some(limit) = limit {
                if messages.len() >= limit {
                    break;
                }
            }
        }
        Ok(messages)
    }

    /// Tombstone a session. Archived sessions accept no further appends but
    /// remain readable.
    pub async fn archive(&self, session_id: SessionId) -> StorageResult<()> {
        let mut session = self.load_session(session_id).await?;
        session.status = SessionStatus::Archived;
        session.updated_at = Utc::now();
        self.persist_meta(&session).await
    }

    /// Find the session whose canonical key matches `key`, if one has been
    /// created. Used to route an inbound message to an existing session
    /// before falling back to `create_session`.
    pub async fn find_by_key(&self, key: &SessionKey) -> StorageResult<Option<Session>> {
        let wanted = key.to_string();
        let sessions = self.list(SessionFilter::default()).await?;
        Ok(sessions.into_iter().find(|s| s.key.to_string() == wanted))
    }

    /// List sessions matching `filter`.
    pub async fn list(&self, filter: SessionFilter) -> StorageResult<Vec<Session>> {
        let mut entries = fs::read_dir(&self.root).await.map_err(|e| StorageError::Io {
            path: self.root.display().to_string(),
            source: e,
        })?;
        let mut sessions = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| StorageError::Io {
            path: self.root.display().to_string(),
            source: e,
        })? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("meta") {
                continue;
            }
            let bytes = fs::read(&path).await.map_err(|e| StorageError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
            let session: Session =
                serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))?;
            if let Some(tenant) = &filter.tenant_id {
                if session.tenant_id.as_ref() != Some(tenant) {
                    continue;
                }
            }
            if let Some(status) = filter.status {
                if session.status != status {
                    continue;
                }
            }
            sessions.push(session);
        }
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::{MessageRole, ToolCallMessageId};
    use std::collections::HashMap as Map;

    fn blank_message() -> Message {
        Message {
            id: ToolCallMessageId::new(),
            session_id: SessionId::new(),
            seq: 0,
            role: MessageRole::User,
            content: serde_json::json!("hi"),
            created_at: Utc::now(),
            token_estimate: 3,
            tool_name: None,
            tool_call_id: None,
            superseded: false,
            metadata: Map::new(),
        }
    }

    #[tokio::test]
    async fn appends_are_gap_free_and_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path()).await.unwrap();
        let session = store
            .create_session(NewSession {
                key: SessionKey::main(meridian_core::AgentId::new("a1")),
                session_type: SessionType::Main,
                tenant_id: None,
                owner_principal: "u1".into(),
                channel_id: None,
                parent_id: None,
                depth: 0,
            })
            .await
            .unwrap();

        for _ in 0..5 {
            store.append_message(session.id, blank_message()).await.unwrap();
        }

        let messages = store.load_messages(session.id, None, None).await.unwrap();
        let seqs: Vec<u64> = messages.iter().map(|m| m.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn append_survives_store_recreation() {
        let dir = tempfile::tempdir().unwrap();
        let session_id;
        {
            let store = SessionStore::open(dir.path()).await.unwrap();
            let session = store
                .create_session(NewSession {
                    key: SessionKey::main(meridian_core::AgentId::new("a1")),
                    session_type: SessionType::Main,
                    tenant_id: None,
                    owner_principal: "u1".into(),
                    channel_id: None,
                    parent_id: None,
                    depth: 0,
                })
                .await
                .unwrap();
            session_id = session.id;
            store.append_message(session.id, blank_message()).await.unwrap();
        }

        let store2 = SessionStore::open(dir.path()).await.unwrap();
        let messages = store2.load_messages(session_id, None, None).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].seq, 1);

        // The recovered writer continues the sequence without a gap.
        store2.append_message(session_id, blank_message()).await.unwrap();
        let messages = store2.load_messages(session_id, None, None).await.unwrap();
        assert_eq!(messages.iter().map(|m| m.seq).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn rejects_depth_beyond_maximum() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path()).await.unwrap();
        let err = store
            .create_session(NewSession {
                key: SessionKey::subagent(meridian_core::AgentId::new("a1"), "sub1".into()),
                session_type: SessionType::Subagent,
                tenant_id: None,
                owner_principal: "u1".into(),
                channel_id: None,
                parent_id: None,
                depth: 4,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }
}
