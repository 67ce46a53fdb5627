//! Raw key-value storage port and its backends.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};

/// Byte-level key-value store with per-key linearizability.
///
/// Keys are UTF-8 path-like strings (`agent/agt-01J...`). All operations
/// are fast; backends may perform synchronous embedded I/O.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a value.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Write a value.
    async fn set(&self, key: &str, value: Vec<u8>) -> StoreResult<()>;

    /// Delete a key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// List `(key, value)` pairs whose key starts with `prefix`, in key
    /// order.
    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, Vec<u8>)>>;

    /// Atomically replace `expected` with `new` (either may be absent).
    /// Returns [`StoreError::Conflict`] when the current value does not
    /// match `expected`.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<Vec<u8>>,
        new: Option<Vec<u8>>,
    ) -> StoreResult<()>;
}

/// In-memory backend for tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryKvStore {
    inner: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryKvStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Internal("store mutex poisoned".to_string()))
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> StoreResult<()> {
        self.lock()?.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, Vec<u8>)>> {
        Ok(self
            .lock()?
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<Vec<u8>>,
        new: Option<Vec<u8>>,
    ) -> StoreResult<()> {
        let mut guard = self.lock()?;
        if guard.get(key).map(Vec::as_slice) != expected.as_deref() {
            return Err(StoreError::Conflict(key.to_string()));
        }
        match new {
            Some(value) => {
                guard.insert(key.to_string(), value);
            }
            None => {
                guard.remove(key);
            }
        }
        Ok(())
    }
}

/// Embedded sled backend used by the daemon.
#[derive(Debug, Clone)]
pub struct SledKvStore {
    db: sled::Db,
}

impl SledKvStore {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Internal`] when the database cannot be opened,
    /// typically because another process holds it.
    pub fn open(path: impl AsRef<std::path::Path>) -> StoreResult<Self> {
        let db = sled::open(path).map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(Self { db })
    }

    /// Flush outstanding writes. Called once on shutdown.
    pub fn flush(&self) -> StoreResult<()> {
        self.db
            .flush()
            .map(|_| ())
            .map_err(|e| StoreError::Internal(e.to_string()))
    }
}

#[async_trait]
impl KvStore for SledKvStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.db
            .get(key)
            .map(|v| v.map(|ivec| ivec.to_vec()))
            .map_err(|e| StoreError::Internal(e.to_string()))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> StoreResult<()> {
        self.db
            .insert(key, value)
            .map(|_| ())
            .map_err(|e| StoreError::Internal(e.to_string()))
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.db
            .remove(key)
            .map(|_| ())
            .map_err(|e| StoreError::Internal(e.to_string()))
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, Vec<u8>)>> {
        let mut out = Vec::new();
        for entry in self.db.scan_prefix(prefix) {
            let (key, value) = entry.map_err(|e| StoreError::Internal(e.to_string()))?;
            let key = String::from_utf8(key.to_vec())
                .map_err(|e| StoreError::InvalidKey(e.to_string()))?;
            out.push((key, value.to_vec()));
        }
        Ok(out)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<Vec<u8>>,
        new: Option<Vec<u8>>,
    ) -> StoreResult<()> {
        match self
            .db
            .compare_and_swap(key, expected, new)
            .map_err(|e| StoreError::Internal(e.to_string()))?
        {
            Ok(()) => Ok(()),
            Err(_) => Err(StoreError::Conflict(key.to_string())),
        }
    }
}

/// Wrapper that prefixes every key with `namespace/`.
#[derive(Clone)]
pub struct ScopedKvStore {
    inner: Arc<dyn KvStore>,
    namespace: String,
}

impl ScopedKvStore {
    /// Create a scope. The namespace must not contain `/`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidKey`] for an empty or slash-containing
    /// namespace.
    pub fn new(inner: Arc<dyn KvStore>, namespace: impl Into<String>) -> StoreResult<Self> {
        let namespace = namespace.into();
        if namespace.is_empty() || namespace.contains('/') {
            return Err(StoreError::InvalidKey(namespace));
        }
        Ok(Self { inner, namespace })
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}/{key}", self.namespace)
    }
}

#[async_trait]
impl KvStore for ScopedKvStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.inner.get(&self.scoped(key)).await
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> StoreResult<()> {
        self.inner.set(&self.scoped(key), value).await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.inner.delete(&self.scoped(key)).await
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, Vec<u8>)>> {
        let scoped_prefix = self.scoped(prefix);
        let strip = format!("{}/", self.namespace);
        Ok(self
            .inner
            .scan_prefix(&scoped_prefix)
            .await?
            .into_iter()
            .filter_map(|(k, v)| k.strip_prefix(&strip).map(|k| (k.to_string(), v)))
            .collect())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<Vec<u8>>,
        new: Option<Vec<u8>>,
    ) -> StoreResult<()> {
        self.inner
            .compare_and_swap(&self.scoped(key), expected, new)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn exercise(store: &dyn KvStore) {
        assert_eq!(store.get("a/1").await.unwrap(), None);

        store.set("a/1", b"one".to_vec()).await.unwrap();
        store.set("a/2", b"two".to_vec()).await.unwrap();
        store.set("b/1", b"other".to_vec()).await.unwrap();
        assert_eq!(store.get("a/1").await.unwrap(), Some(b"one".to_vec()));

        let scanned = store.scan_prefix("a/").await.unwrap();
        assert_eq!(scanned.len(), 2);
        assert_eq!(scanned[0].0, "a/1");

        store.delete("a/1").await.unwrap();
        assert_eq!(store.get("a/1").await.unwrap(), None);
        // Idempotent delete.
        store.delete("a/1").await.unwrap();
    }

    #[tokio::test]
    async fn memory_store_basics() {
        exercise(&MemoryKvStore::new()).await;
    }

    #[tokio::test]
    async fn sled_store_basics() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledKvStore::open(dir.path()).unwrap();
        exercise(&store).await;
    }

    #[tokio::test]
    async fn memory_cas_detects_conflict() {
        let store = MemoryKvStore::new();
        store.set("k", b"v1".to_vec()).await.unwrap();

        store
            .compare_and_swap("k", Some(b"v1".to_vec()), Some(b"v2".to_vec()))
            .await
            .unwrap();

        let err = store
            .compare_and_swap("k", Some(b"v1".to_vec()), Some(b"v3".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.get("k").await.unwrap(), Some(b"v2".to_vec()));
    }

    #[tokio::test]
    async fn sled_cas_detects_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledKvStore::open(dir.path()).unwrap();
        store.set("k", b"v1".to_vec()).await.unwrap();

        store
            .compare_and_swap("k", Some(b"v1".to_vec()), Some(b"v2".to_vec()))
            .await
            .unwrap();
        let err = store
            .compare_and_swap("k", Some(b"v1".to_vec()), Some(b"v3".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn scoped_store_isolates_namespaces() {
        let root: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let a = ScopedKvStore::new(Arc::clone(&root), "ns-a").unwrap();
        let b = ScopedKvStore::new(Arc::clone(&root), "ns-b").unwrap();

        a.set("key", b"from-a".to_vec()).await.unwrap();
        assert_eq!(b.get("key").await.unwrap(), None);
        assert_eq!(a.get("key").await.unwrap(), Some(b"from-a".to_vec()));

        let scanned = a.scan_prefix("").await.unwrap();
        assert_eq!(scanned, vec![("key".to_string(), b"from-a".to_vec())]);
    }

    #[test]
    fn scoped_store_rejects_bad_namespace() {
        let root: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        assert!(ScopedKvStore::new(Arc::clone(&root), "").is_err());
        assert!(ScopedKvStore::new(root, "a/b").is_err());
    }
}
