//! Persist and delete steps.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use stigmer_api::Resource;
use stigmer_core::Clock;
use stigmer_core::meta::version_of;
use stigmer_store::{StoreError, TypedStore};

use crate::{PipelineError, RequestContext, Step};

/// Serializes the new state and writes it under `{kind}/{id}`.
///
/// Updates go through a compare-and-swap against the loaded resource:
/// a concurrent writer surfaces as `ABORTED` and the caller retries.
pub struct Persist<R> {
    store: TypedStore<R>,
}

impl<R: Resource> Persist<R> {
    /// Create the step over the kind's typed store.
    #[must_use]
    pub fn new(store: TypedStore<R>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<Req: Send + Sync, R: Resource> Step<Req, R> for Persist<R> {
    fn name(&self) -> &'static str {
        "persist"
    }

    async fn execute(&self, ctx: &mut RequestContext<Req, R>) -> Result<(), PipelineError> {
        let state = ctx
            .new_state
            .as_ref()
            .ok_or_else(|| PipelineError::internal("new state missing"))?;

        match &ctx.existing {
            Some(existing) => {
                let expected = version_of(existing);
                self.store
                    .save_versioned(state, expected)
                    .await
                    .map_err(|err| match err {
                        StoreError::Conflict(_) => PipelineError::conflict(format!(
                            "{} {} version {expected} was modified concurrently",
                            R::KIND,
                            state.id(),
                        )),
                        other => other.into(),
                    })
            }
            None => self.store.save(state).await.map_err(Into::into),
        }
    }
}

/// Tombstone audit record written on delete.
#[derive(Debug, Serialize)]
struct Tombstone<'a> {
    id: &'a str,
    kind: &'a str,
    org: &'a str,
    slug: &'a str,
    version: u64,
    deleted_at: String,
}

/// Deletes `ctx.existing` by id, writing a tombstone audit record. A
/// missing resource is a no-op so deletes are idempotent.
pub struct DeleteResource<R> {
    store: TypedStore<R>,
    clock: Arc<dyn Clock>,
}

impl<R: Resource> DeleteResource<R> {
    /// Create the step.
    #[must_use]
    pub fn new(store: TypedStore<R>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }
}

#[async_trait]
impl<Req: Send + Sync, R: Resource> Step<Req, R> for DeleteResource<R> {
    fn name(&self) -> &'static str {
        "delete_resource"
    }

    async fn execute(&self, ctx: &mut RequestContext<Req, R>) -> Result<(), PipelineError> {
        let Some(existing) = &ctx.existing else {
            // Already gone; idempotent success.
            return Ok(());
        };

        let tombstone = Tombstone {
            id: existing.id(),
            kind: R::KIND.kind_name(),
            org: existing.org(),
            slug: existing.slug(),
            version: version_of(existing),
            deleted_at: self.clock.now_rfc3339(),
        };
        let bytes = serde_json::to_vec(&tombstone)
            .map_err(|e| PipelineError::internal(format!("tombstone encoding: {e}")))?;

        self.store.delete(existing, bytes).await.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use stigmer_api::v1::{Agent, ApiResourceMetadata, AuditFields};
    use stigmer_core::{ErrorKind, FixedClock};
    use stigmer_store::MemoryKvStore;

    fn agent(id: &str, version: u64) -> Agent {
        Agent {
            metadata: Some(ApiResourceMetadata {
                id: id.to_string(),
                name: "reviewer".to_string(),
                slug: "reviewer".to_string(),
                org: "acme".to_string(),
                audit: Some(AuditFields {
                    version,
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock(Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()))
    }

    #[tokio::test]
    async fn create_persists() {
        let store: TypedStore<Agent> = TypedStore::new(Arc::new(MemoryKvStore::new()));
        let step = Persist::new(store.clone());
        let mut ctx: RequestContext<(), Agent> = RequestContext::new(());
        ctx.new_state = Some(agent("agt-1", 1));
        step.execute(&mut ctx).await.unwrap();
        assert!(store.get("agt-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn concurrent_update_aborts() {
        let store: TypedStore<Agent> = TypedStore::new(Arc::new(MemoryKvStore::new()));
        let loaded = agent("agt-1", 1);
        store.save(&loaded).await.unwrap();

        // Another writer advances the resource after our load.
        store.save(&agent("agt-1", 2)).await.unwrap();

        let step = Persist::new(store);
        let mut ctx: RequestContext<(), Agent> = RequestContext::new(());
        ctx.existing = Some(loaded);
        ctx.new_state = Some(agent("agt-1", 2));
        let err = step.execute(&mut ctx).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
        assert!(err.retryable);
    }

    #[tokio::test]
    async fn delete_is_idempotent_and_writes_tombstone() {
        let kv = Arc::new(MemoryKvStore::new());
        let store: TypedStore<Agent> = TypedStore::new(kv.clone());
        let existing = agent("agt-1", 3);
        store.save(&existing).await.unwrap();

        let step = DeleteResource::new(store.clone(), clock());

        let mut ctx: RequestContext<(), Agent> = RequestContext::new(());
        ctx.existing = Some(existing);
        step.execute(&mut ctx).await.unwrap();
        assert!(store.get("agt-1").await.unwrap().is_none());

        use stigmer_store::KvStore;
        let tombstone = kv.get("tombstone/agent/agt-1").await.unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&tombstone).unwrap();
        assert_eq!(json["kind"], "Agent");
        assert_eq!(json["version"], 3);

        // Second delete: existing is None, still succeeds.
        let mut ctx: RequestContext<(), Agent> = RequestContext::new(());
        step.execute(&mut ctx).await.unwrap();
    }
}
