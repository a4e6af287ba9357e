//! The append-only audit log.

use crate::entry::{AuditAction, AuditEntry, AuditOutcome};
use crate::error::{AuditError, AuditResult};
use meridian_core::{SessionId, TenantId};
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Durable, append-only record of security-relevant operations.
///
/// Entries are written one JSON object per line to `audit/log.jsonl` under
/// the data root, `fsync`'d on every append, and never rewritten in place.
pub struct AuditLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl AuditLog {
    /// Open (creating if necessary) the audit log under `data_root`.
    pub async fn open(data_root: impl Into<PathBuf>) -> AuditResult<Self> {
        let dir = data_root.into().join("audit");
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| AuditError::Storage(meridian_storage::StorageError::Io {
                path: dir.display().to_string(),
                source: e,
            }))?;
        Ok(Self {
            path: dir.join("log.jsonl"),
            write_lock: Mutex::new(()),
        })
    }

    /// Append a new entry and return it.
    pub async fn append(
        &self,
        session_id: Option<SessionId>,
        tenant_id: Option<TenantId>,
        action: AuditAction,
        outcome: AuditOutcome,
    ) -> AuditResult<AuditEntry> {
        let entry = AuditEntry::new(session_id, tenant_id, action, outcome);
        let line = serde_json::to_string(&entry).map_err(|e| AuditError::Serialization(e.to_string()))?;

        let _guard = self.write_lock.lock().await;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| AuditError::Storage(meridian_storage::StorageError::Io {
                path: self.path.display().to_string(),
                source: e,
            }))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| AuditError::Storage(meridian_storage::StorageError::Io {
                path: self.path.display().to_string(),
                source: e,
            }))?;
        file.write_all(b"\n")
            .await
            .map_err(|e| AuditError::Storage(meridian_storage::StorageError::Io {
                path: self.path.display().to_string(),
                source: e,
            }))?;
        file.sync_all()
            .await
            .map_err(|e| AuditError::Storage(meridian_storage::StorageError::Io {
                path: self.path.display().to_string(),
                source: e,
            }))?;
        debug!(entry_id = %entry.id, "appended audit entry");
        Ok(entry)
    }

    /// Read every entry, in append order.
    pub async fn all(&self) -> AuditResult<Vec<AuditEntry>> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(AuditError::Storage(meridian_storage::StorageError::Io {
                    path: self.path.display().to_string(),
                    source: e,
                }))
            }
        };
        contents
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(|e| AuditError::Serialization(e.to_string())))
            .collect()
    }

    /// Read every entry scoped to `session_id`, in append order.
    pub async fn for_session(&self, session_id: SessionId) -> AuditResult<Vec<AuditEntry>> {
        Ok(self
            .all()
            .await?
            .into_iter()
            .filter(|e| e.session_id == Some(session_id))
            .collect())
    }
}
