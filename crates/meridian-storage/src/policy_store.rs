//! Policy Store & Cache (spec §4.L4): `policies/{policy_id}.json`.
//!
//! This module owns durable CRUD only; the evaluation cache lives in
//! `meridian-policy`, which invalidates itself on every mutation observed
//! here (spec's "cache invalidated on any mutation" invariant).

use crate::error::{StorageError, StorageResult};
use crate::kv::{Storage, Store};
use meridian_core::{Policy, PolicyId};

/// Persists [`Policy`] records through a [`Storage`] backend's `policies`
/// namespace.
pub struct PolicyStore {
    store: Box<dyn Store>,
}

impl PolicyStore {
    /// Open the `policies` namespace of `backend`.
    pub async fn open(backend: &dyn Storage) -> StorageResult<Self> {
        Ok(Self {
            store: backend.open("policies").await?,
        })
    }

    /// Create or replace a policy record.
    pub async fn put(&self, policy: &Policy) -> StorageResult<()> {
        let bytes = serde_json::to_vec(policy).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.store.put(&format!("{}.json", policy.id), &bytes).await
    }

    /// Load a policy by id.
    pub async fn get(&self, id: &PolicyId) -> StorageResult<Policy> {
        let bytes = self
            .store
            .get(&format!("{id}.json"))
            .await?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// Remove a policy record.
    pub async fn delete(&self, id: &PolicyId) -> StorageResult<()> {
        self.store.delete(&format!("{id}.json")).await
    }

    /// List every policy record, for loading the evaluation cache at startup.
    pub async fn list(&self) -> StorageResult<Vec<Policy>> {
        let entries = self.store.scan("").await?;
        entries
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_store::FileStorage;
    use meridian_core::PolicyEffect;

    fn sample(id: PolicyId) -> Policy {
        Policy {
            id,
            name: "allow-all-reads".into(),
            effect: PolicyEffect::Allow,
            principals: vec!["*".into()],
            resources: vec!["*".into()],
            actions: vec!["read".into()],
            priority: 0,
            conditions: vec![],
            tenant_scope: None,
        }
    }

    #[tokio::test]
    async fn round_trips_through_the_file_backend() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileStorage::new(dir.path());
        let store = PolicyStore::open(&backend).await.unwrap();
        let policy = sample(PolicyId::new());
        store.put(&policy).await.unwrap();

        let loaded = store.get(&policy.id).await.unwrap();
        assert_eq!(loaded.name, policy.name);

        store.delete(&policy.id).await.unwrap();
        assert!(store.get(&policy.id).await.is_err());
    }
}
