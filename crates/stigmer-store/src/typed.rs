//! Typed resource store: prost-encoded resources under `{kind}/{id}`,
//! with the slug index and tombstone audit records.

use std::marker::PhantomData;
use std::sync::Arc;

use prost::Message;
use stigmer_api::Resource;

use crate::error::{StoreError, StoreResult};
use crate::kv::KvStore;

fn stored_version<R: Resource>(resource: &R) -> u64 {
    resource
        .meta()
        .and_then(|m| m.audit.as_ref())
        .map_or(0, |a| a.version)
}

/// Store facade for one resource kind.
pub struct TypedStore<R> {
    kv: Arc<dyn KvStore>,
    _marker: PhantomData<fn() -> R>,
}

impl<R> Clone for TypedStore<R> {
    fn clone(&self) -> Self {
        Self {
            kv: Arc::clone(&self.kv),
            _marker: PhantomData,
        }
    }
}

impl<R: Resource> TypedStore<R> {
    /// Create a typed view over the shared KV handle.
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            _marker: PhantomData,
        }
    }

    fn resource_key(id: &str) -> String {
        format!("{}/{id}", R::KIND.storage_prefix())
    }

    fn slug_key(org: &str, slug: &str) -> String {
        format!("{}:slug/{org}/{slug}", R::KIND.storage_prefix())
    }

    fn tombstone_key(id: &str) -> String {
        format!("tombstone/{}/{id}", R::KIND.storage_prefix())
    }

    fn decode(bytes: &[u8]) -> StoreResult<R> {
        R::decode(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Load a resource by id.
    pub async fn get(&self, id: &str) -> StoreResult<Option<R>> {
        match self.kv.get(&Self::resource_key(id)).await? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Write a resource unconditionally and index its slug.
    pub async fn save(&self, resource: &R) -> StoreResult<()> {
        let id = resource.id();
        if id.is_empty() {
            return Err(StoreError::InvalidKey("resource id is empty".to_string()));
        }
        self.kv
            .set(&Self::resource_key(id), resource.encode_to_vec())
            .await?;
        self.index_slug(resource).await
    }

    /// Write a resource only when the stored copy still carries
    /// `expected_version`. The swap runs against the exact stored bytes,
    /// so map-field encoding order cannot produce false conflicts.
    pub async fn save_versioned(
        &self,
        resource: &R,
        expected_version: u64,
    ) -> StoreResult<()> {
        let id = resource.id();
        if id.is_empty() {
            return Err(StoreError::InvalidKey("resource id is empty".to_string()));
        }
        let key = Self::resource_key(id);

        let current_bytes = self.kv.get(&key).await?;
        match &current_bytes {
            Some(bytes) => {
                let current = Self::decode(bytes)?;
                if stored_version(&current) != expected_version {
                    return Err(StoreError::Conflict(key));
                }
            }
            None => return Err(StoreError::Conflict(key)),
        }

        self.kv
            .compare_and_swap(&key, current_bytes, Some(resource.encode_to_vec()))
            .await?;
        self.index_slug(resource).await
    }

    async fn index_slug(&self, resource: &R) -> StoreResult<()> {
        let slug = resource.slug();
        let org = resource.org();
        if slug.is_empty() {
            return Ok(());
        }
        self.kv
            .set(
                &Self::slug_key(org, slug),
                resource.id().as_bytes().to_vec(),
            )
            .await
    }

    /// Resolve `{org, slug}` to an id via the index.
    pub async fn resolve_slug(&self, org: &str, slug: &str) -> StoreResult<Option<String>> {
        match self.kv.get(&Self::slug_key(org, slug)).await? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// Delete a resource, drop its slug index entry, and write a
    /// tombstone audit record. Deleting a missing id is a no-op.
    pub async fn delete(&self, resource: &R, tombstone: Vec<u8>) -> StoreResult<()> {
        let id = resource.id();
        self.kv.delete(&Self::resource_key(id)).await?;
        let slug = resource.slug();
        if !slug.is_empty() {
            self.kv.delete(&Self::slug_key(resource.org(), slug)).await?;
        }
        self.kv.set(&Self::tombstone_key(id), tombstone).await
    }

    /// Remove a resource and its slug index entry without writing a
    /// tombstone. Used by compensation paths rolling back a write that
    /// never became visible.
    pub async fn remove(&self, resource: &R) -> StoreResult<()> {
        self.kv.delete(&Self::resource_key(resource.id())).await?;
        let slug = resource.slug();
        if !slug.is_empty() {
            self.kv.delete(&Self::slug_key(resource.org(), slug)).await?;
        }
        Ok(())
    }

    /// List resources, optionally filtered by org.
    pub async fn list(&self, org: Option<&str>) -> StoreResult<Vec<R>> {
        let prefix = format!("{}/", R::KIND.storage_prefix());
        let mut out = Vec::new();
        for (_, bytes) in self.kv.scan_prefix(&prefix).await? {
            let resource = Self::decode(&bytes)?;
            if org.map_or(true, |o| resource.org() == o) {
                out.push(resource);
            }
        }
        Ok(out)
    }

    /// Raw stored bytes for a resource, for callers that need to inspect
    /// the serialized form.
    pub async fn raw(&self, id: &str) -> StoreResult<Option<Vec<u8>>> {
        self.kv.get(&Self::resource_key(id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvStore;
    use stigmer_api::v1::{Agent, ApiResourceMetadata, AuditFields};

    fn agent(id: &str, name: &str) -> Agent {
        Agent {
            metadata: Some(ApiResourceMetadata {
                id: id.to_string(),
                name: name.to_string(),
                slug: name.to_lowercase(),
                org: "acme".to_string(),
                audit: Some(AuditFields {
                    version: 1,
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn store() -> TypedStore<Agent> {
        TypedStore::new(Arc::new(MemoryKvStore::new()))
    }

    #[tokio::test]
    async fn save_get_roundtrip() {
        let store = store();
        let resource = agent("agt-1", "reviewer");
        store.save(&resource).await.unwrap();

        let loaded = store.get("agt-1").await.unwrap().unwrap();
        assert_eq!(loaded, resource);
        assert_eq!(store.get("agt-missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn slug_index_resolves() {
        let store = store();
        store.save(&agent("agt-1", "reviewer")).await.unwrap();

        let id = store.resolve_slug("acme", "reviewer").await.unwrap();
        assert_eq!(id, Some("agt-1".to_string()));
        assert_eq!(store.resolve_slug("acme", "other").await.unwrap(), None);
        assert_eq!(store.resolve_slug("zorg", "reviewer").await.unwrap(), None);
    }

    #[tokio::test]
    async fn save_versioned_detects_concurrent_write() {
        let store = store();
        let v1 = agent("agt-1", "reviewer");
        store.save(&v1).await.unwrap();

        let mut v2 = v1.clone();
        v2.metadata.as_mut().unwrap().audit.as_mut().unwrap().version = 2;
        store.save_versioned(&v2, 1).await.unwrap();

        // A writer that still loaded version 1 loses.
        let mut stale = v1.clone();
        stale.metadata.as_mut().unwrap().audit.as_mut().unwrap().version = 2;
        let err = store.save_versioned(&stale, 1).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn save_versioned_requires_an_existing_copy() {
        let store = store();
        let err = store
            .save_versioned(&agent("agt-9", "ghost"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn delete_removes_resource_slug_and_writes_tombstone() {
        let kv = Arc::new(MemoryKvStore::new());
        let store: TypedStore<Agent> = TypedStore::new(kv.clone());
        let resource = agent("agt-1", "reviewer");
        store.save(&resource).await.unwrap();

        store.delete(&resource, b"tombstone".to_vec()).await.unwrap();

        assert_eq!(store.get("agt-1").await.unwrap(), None);
        assert_eq!(store.resolve_slug("acme", "reviewer").await.unwrap(), None);
        let tombstone = kv.get("tombstone/agent/agt-1").await.unwrap();
        assert_eq!(tombstone, Some(b"tombstone".to_vec()));
    }

    #[tokio::test]
    async fn list_filters_by_org() {
        let store = store();
        store.save(&agent("agt-1", "a")).await.unwrap();
        let mut other = agent("agt-2", "b");
        other.metadata.as_mut().unwrap().org = "zorg".to_string();
        store.save(&other).await.unwrap();

        assert_eq!(store.list(None).await.unwrap().len(), 2);
        assert_eq!(store.list(Some("acme")).await.unwrap().len(), 1);
        assert_eq!(store.list(Some("nobody")).await.unwrap().len(), 0);
    }
}
