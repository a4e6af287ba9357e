//! Credential Pool persistence (spec §4.M6): `credentials/{provider}/{id}.json`.

use crate::error::{StorageError, StorageResult};
use crate::kv::{Storage, Store};
use meridian_core::{Credential, CredentialId};

/// Persists [`Credential`] records through a [`Storage`] backend's
/// `credentials` namespace, scoped per provider.
pub struct CredentialStore {
    store: Box<dyn Store>,
}

impl CredentialStore {
    /// Open the `credentials` namespace of `backend`.
    pub async fn open(backend: &dyn Storage) -> StorageResult<Self> {
        Ok(Self {
            store: backend.open("credentials").await?,
        })
    }

    /// Create or replace a credential record.
    pub async fn put(&self, credential: &Credential) -> StorageResult<()> {
        let bytes = serde_json::to_vec(credential).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.store
            .put(&format!("{}/{}.json", credential.provider, credential.id), &bytes)
            .await
    }

    /// Load a credential by provider and id.
    pub async fn get(&self, provider: &str, id: &CredentialId) -> StorageResult<Credential> {
        let bytes = self
            .store
            .get(&format!("{provider}/{id}.json"))
            .await?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// Remove a credential record.
    pub async fn delete(&self, provider: &str, id: &CredentialId) -> StorageResult<()> {
        self.store.delete(&format!("{provider}/{id}.json")).await
    }

    /// List every credential for `provider`.
    pub async fn list_for_provider(&self, provider: &str) -> StorageResult<Vec<Credential>> {
        let entries = self.store.scan(&format!("{provider}/")).await?;
        entries
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string())))
            .collect()
    }
}
