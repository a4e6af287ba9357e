//! Filesystem-backed [`Storage`]: one directory per namespace under a
//! configurable data root, honoring the exact layout spec §6 describes for
//! `sessions/`, `tenants/`, `policies/`, `credentials/`, and `jobs/`.

use crate::error::{StorageError, StorageResult};
use crate::kv::{Storage, Store};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Opens [`FileStore`] namespaces rooted at a single data directory.
pub struct FileStorage {
    data_root: PathBuf,
}

impl FileStorage {
    /// Create a backend rooted at `data_root`. The root is created lazily on
    /// first write, not at construction time.
    #[must_use]
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
        }
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn open(&self, namespace: &str) -> StorageResult<Box<dyn Store>> {
        let dir = self.data_root.join(namespace);
        fs::create_dir_all(&dir).await.map_err(|e| StorageError::Io {
            path: dir.display().to_string(),
            source: e,
        })?;
        Ok(Box::new(FileStore { dir }))
    }
}

/// A single namespace directory, where each key maps to a file path
/// (`/`-separated key segments become nested directories).
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() || key.contains("..") {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(key))
    }
}

#[async_trait]
impl Store for FileStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> StorageResult<()> {
        let path = self.key_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| StorageError::Io {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        let mut file = fs::File::create(&path).await.map_err(|e| StorageError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        file.write_all(bytes).await.map_err(|e| StorageError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        file.sync_all().await.map_err(|e| StorageError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.key_path(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io {
                path: path.display().to_string(),
                source: e,
            }),
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io {
                path: path.display().to_string(),
                source: e,
            }),
        }
    }

    async fn scan(&self, prefix: &str) -> StorageResult<Vec<(String, Vec<u8>)>> {
        let mut out = Vec::new();
        collect_matching(&self.dir, &self.dir, prefix, &mut out).await?;
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }
}

fn collect_matching<'a>(
    root: &'a Path,
    dir: &'a Path,
    prefix: &'a str,
    out: &'a mut Vec<(String, Vec<u8>)>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = StorageResult<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(StorageError::Io {
                    path: dir.display().to_string(),
                    source: e,
                })
            }
        };
        while let Some(entry) = entries.next_entry().await.map_err(|e| StorageError::Io {
            path: dir.display().to_string(),
            source: e,
        })? {
            let path = entry.path();
            if path.is_dir() {
                collect_matching(root, &path, prefix, out).await?;
                continue;
            }
            let rel = path
                .strip_prefix(root)
                .expect("entry is under root")
                .to_string_lossy()
                .replace(std::path::MAIN_SEPARATOR, "/");
            if rel.starts_with(prefix) {
                let bytes = fs::read(&path).await.map_err(|e| StorageError::Io {
                    path: path.display().to_string(),
                    source: e,
                })?;
                out.push((rel, bytes));
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_survives_a_fresh_handle_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileStorage::new(dir.path());
        let store = backend.open("sessions").await.unwrap();
        store.put("abc.meta", b"{\"id\":\"abc\"}").await.unwrap();
        drop(store);

        let backend2 = FileStorage::new(dir.path());
        let store2 = backend2.open("sessions").await.unwrap();
        let bytes = store2.get("abc.meta").await.unwrap().unwrap();
        assert_eq!(bytes, b"{\"id\":\"abc\"}");
    }

    #[tokio::test]
    async fn nested_keys_scan_under_their_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileStorage::new(dir.path());
        let store = backend.open("credentials").await.unwrap();
        store.put("openai/a.json", b"1").await.unwrap();
        store.put("openai/b.json", b"2").await.unwrap();
        store.put("anthropic/c.json", b"3").await.unwrap();

        let results = store.scan("openai/").await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn rejects_path_traversal_keys() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileStorage::new(dir.path());
        let store = backend.open("sessions").await.unwrap();
        let err = store.put("../escape", b"x").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }
}
