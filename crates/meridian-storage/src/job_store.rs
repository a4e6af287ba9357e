//! Scheduler job persistence (spec §4.H2): `jobs/{job_id}.json`.

use crate::error::{StorageError, StorageResult};
use crate::kv::{Storage, Store};
use meridian_core::{Job, JobId};

/// Persists [`Job`] records (schedule, payload, and recomputable state)
/// through a [`Storage`] backend's `jobs` namespace.
pub struct JobStore {
    store: Box<dyn Store>,
}

impl JobStore {
    /// Open the `jobs` namespace of `backend`.
    pub async fn open(backend: &dyn Storage) -> StorageResult<Self> {
        Ok(Self {
            store: backend.open("jobs").await?,
        })
    }

    /// Create or replace a job record.
    pub async fn put(&self, job: &Job) -> StorageResult<()> {
        let bytes = serde_json::to_vec(job).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.store.put(&format!("{}.json", job.id), &bytes).await
    }

    /// Load a job by id.
    pub async fn get(&self, id: &JobId) -> StorageResult<Job> {
        let bytes = self
            .store
            .get(&format!("{id}.json"))
            .await?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// Remove a job record.
    pub async fn delete(&self, id: &JobId) -> StorageResult<()> {
        self.store.delete(&format!("{id}.json")).await
    }

    /// List every job, for recomputing `next_run_at` on scheduler startup.
    pub async fn list(&self) -> StorageResult<Vec<Job>> {
        let entries = self.store.scan("").await?;
        entries
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string())))
            .collect()
    }
}
