//! The Storage Port (spec §4.Z): a uniform interface to persistent backends.

use crate::error::StorageResult;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// A single namespace's byte-oriented key-value store.
///
/// A successful `put` must survive process restart (spec's durability
/// contract). Implementations choose how: `fsync`, WAL, or otherwise.
#[async_trait]
pub trait Store: Send + Sync {
    /// Write `bytes` under `key`, replacing any existing value.
    async fn put(&self, key: &str, bytes: &[u8]) -> StorageResult<()>;

    /// Read the bytes stored under `key`, if present.
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Remove `key`, if present. Not an error if absent.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// List all `(key, bytes)` pairs whose key starts with `prefix`, in
    /// lexicographic key order.
    async fn scan(&self, prefix: &str) -> StorageResult<Vec<(String, Vec<u8>)>>;
}

/// Opens namespaced [`Store`] handles. One `Storage` backend serves every
/// namespace (`sessions`, `tenants`, `policies`, `credentials/{provider}`,
/// `jobs`) used by the Session Store, Tenant Store, Policy Store, Credential
/// Pool and Scheduler.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Open (creating if necessary) the store for `namespace`.
    async fn open(&self, namespace: &str) -> StorageResult<Box<dyn Store>>;
}

/// An in-memory [`Store`], used by tests and as a reference implementation.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<BTreeMap<String, Vec<u8>>>,
}

#[async_trait]
impl Store for MemoryStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> StorageResult<()> {
        self.data.lock().unwrap().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.data.lock().unwrap().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.data.lock().unwrap().remove(key);
        Ok(())
    }

    async fn scan(&self, prefix: &str) -> StorageResult<Vec<(String, Vec<u8>)>> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
