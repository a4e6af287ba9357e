//! Tenant & Quota Store (spec §4.L3): `tenants/{tenant_id}.json`.

use crate::error::{StorageError, StorageResult};
use crate::kv::{Storage, Store};
use meridian_core::{Tenant, TenantId};

/// Persists [`Tenant`] records through a [`Storage`] backend's `tenants`
/// namespace.
pub struct TenantStore {
    store: Box<dyn Store>,
}

impl TenantStore {
    /// Open the `tenants` namespace of `backend`.
    pub async fn open(backend: &dyn Storage) -> StorageResult<Self> {
        Ok(Self {
            store: backend.open("tenants").await?,
        })
    }

    /// Create or replace a tenant record.
    pub async fn put(&self, tenant: &Tenant) -> StorageResult<()> {
        let bytes = serde_json::to_vec(tenant).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.store.put(&format!("{}.json", tenant.id), &bytes).await
    }

    /// Load a tenant by id.
    pub async fn get(&self, id: &TenantId) -> StorageResult<Tenant> {
        let bytes = self
            .store
            .get(&format!("{id}.json"))
            .await?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// Remove a tenant record.
    pub async fn delete(&self, id: &TenantId) -> StorageResult<()> {
        self.store.delete(&format!("{id}.json")).await
    }

    /// List all tenant records.
    pub async fn list(&self) -> StorageResult<Vec<Tenant>> {
        let entries = self.store.scan("").await?;
        entries
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string())))
            .collect()
    }
}
