//! Load steps: by id, by reference, and the Apply lookup.

use async_trait::async_trait;
use stigmer_api::Resource;
use stigmer_api::v1::{ApiResourceReference, api_resource_reference};
use stigmer_store::TypedStore;

use crate::{PipelineError, RequestContext, Step};

fn resolve_id<Req, R: Resource>(ctx: &RequestContext<Req, R>) -> Result<String, PipelineError> {
    if let Some(id) = &ctx.resource_id {
        return Ok(id.clone());
    }
    if let Some(state) = &ctx.new_state {
        let id = state.id();
        if !id.is_empty() {
            return Ok(id.to_string());
        }
    }
    Err(PipelineError::invalid_argument(
        "resource id missing from request",
    ))
}

/// Loads the current resource into `ctx.existing`; `NOT_FOUND` if absent.
pub struct LoadExisting<R> {
    store: TypedStore<R>,
}

impl<R: Resource> LoadExisting<R> {
    /// Create the step over the kind's typed store.
    #[must_use]
    pub fn new(store: TypedStore<R>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<Req: Send + Sync, R: Resource> Step<Req, R> for LoadExisting<R> {
    fn name(&self) -> &'static str {
        "load_existing"
    }

    async fn execute(&self, ctx: &mut RequestContext<Req, R>) -> Result<(), PipelineError> {
        let id = resolve_id(ctx)?;
        match self.store.get(&id).await? {
            Some(resource) => {
                ctx.existing = Some(resource);
                ctx.resource_id = Some(id);
                Ok(())
            }
            None => Err(PipelineError::not_found(format!("{} {id} not found", R::KIND))),
        }
    }
}

/// Like [`LoadExisting`] but tolerates an already-deleted resource so
/// deletes stay idempotent.
pub struct LoadExistingForDelete<R> {
    store: TypedStore<R>,
}

impl<R: Resource> LoadExistingForDelete<R> {
    /// Create the step over the kind's typed store.
    #[must_use]
    pub fn new(store: TypedStore<R>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<Req: Send + Sync, R: Resource> Step<Req, R> for LoadExistingForDelete<R> {
    fn name(&self) -> &'static str {
        "load_existing_for_delete"
    }

    async fn execute(&self, ctx: &mut RequestContext<Req, R>) -> Result<(), PipelineError> {
        let id = resolve_id(ctx)?;
        ctx.existing = self.store.get(&id).await?;
        ctx.resource_id = Some(id);
        Ok(())
    }
}

/// Resolves `{org, slug}` (or a raw id) to the stored resource.
pub struct LoadByReference<R> {
    store: TypedStore<R>,
}

impl<R: Resource> LoadByReference<R> {
    /// Create the step over the kind's typed store.
    #[must_use]
    pub fn new(store: TypedStore<R>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<R: Resource> Step<ApiResourceReference, R> for LoadByReference<R> {
    fn name(&self) -> &'static str {
        "load_by_reference"
    }

    async fn execute(
        &self,
        ctx: &mut RequestContext<ApiResourceReference, R>,
    ) -> Result<(), PipelineError> {
        let id = match &ctx.request().handle {
            Some(api_resource_reference::Handle::Id(id)) => id.clone(),
            Some(api_resource_reference::Handle::SlugRef(slug_ref)) => self
                .store
                .resolve_slug(&slug_ref.org, &slug_ref.slug)
                .await?
                .ok_or_else(|| {
                    PipelineError::not_found(format!(
                        "{} {:?} not found in org {:?}",
                        R::KIND,
                        slug_ref.slug,
                        slug_ref.org
                    ))
                })?,
            None => {
                return Err(PipelineError::invalid_argument("reference handle missing"));
            }
        };

        match self.store.get(&id).await? {
            Some(resource) => {
                ctx.existing = Some(resource);
                ctx.resource_id = Some(id);
                Ok(())
            }
            None => Err(PipelineError::not_found(format!("{} {id} not found", R::KIND))),
        }
    }
}

/// Sets `ctx.should_create` from the slug lookup so Apply can delegate
/// to Create or Update.
pub struct LoadForApply<R> {
    store: TypedStore<R>,
}

impl<R: Resource> LoadForApply<R> {
    /// Create the step over the kind's typed store.
    #[must_use]
    pub fn new(store: TypedStore<R>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<Req: Send + Sync, R: Resource> Step<Req, R> for LoadForApply<R> {
    fn name(&self) -> &'static str {
        "load_for_apply"
    }

    async fn execute(&self, ctx: &mut RequestContext<Req, R>) -> Result<(), PipelineError> {
        let state = ctx
            .new_state
            .as_ref()
            .ok_or_else(|| PipelineError::internal("new state missing"))?;
        let (org, slug) = (state.org().to_string(), state.slug().to_string());

        let existing = match self.store.resolve_slug(&org, &slug).await? {
            Some(id) => self.store.get(&id).await?,
            None => None,
        };
        ctx.should_create = Some(existing.is_none());
        ctx.existing = existing;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use stigmer_api::v1::{Agent, ApiResourceMetadata, SlugReference};
    use stigmer_core::ErrorKind;
    use stigmer_store::MemoryKvStore;

    fn agent(id: &str, slug: &str) -> Agent {
        Agent {
            metadata: Some(ApiResourceMetadata {
                id: id.to_string(),
                name: slug.to_string(),
                slug: slug.to_string(),
                org: "acme".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    async fn store_with(resource: &Agent) -> TypedStore<Agent> {
        let store: TypedStore<Agent> = TypedStore::new(Arc::new(MemoryKvStore::new()));
        store.save(resource).await.unwrap();
        store
    }

    #[tokio::test]
    async fn load_existing_not_found() {
        let store: TypedStore<Agent> = TypedStore::new(Arc::new(MemoryKvStore::new()));
        let step = LoadExisting::new(store);
        let mut ctx: RequestContext<(), Agent> = RequestContext::new(());
        ctx.resource_id = Some("agt-missing".to_string());
        let err = step.execute(&mut ctx).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn load_for_delete_tolerates_missing() {
        let store: TypedStore<Agent> = TypedStore::new(Arc::new(MemoryKvStore::new()));
        let step = LoadExistingForDelete::new(store);
        let mut ctx: RequestContext<(), Agent> = RequestContext::new(());
        ctx.resource_id = Some("agt-missing".to_string());
        step.execute(&mut ctx).await.unwrap();
        assert!(ctx.existing.is_none());
    }

    #[tokio::test]
    async fn load_by_reference_via_slug() {
        let step = LoadByReference::new(store_with(&agent("agt-1", "reviewer")).await);
        let reference = ApiResourceReference {
            handle: Some(api_resource_reference::Handle::SlugRef(SlugReference {
                org: "acme".to_string(),
                slug: "reviewer".to_string(),
            })),
        };
        let mut ctx: RequestContext<ApiResourceReference, Agent> = RequestContext::new(reference);
        step.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.existing.as_ref().unwrap().id(), "agt-1");
    }

    #[tokio::test]
    async fn load_for_apply_flags_create_or_update() {
        let store = store_with(&agent("agt-1", "reviewer")).await;
        let step = LoadForApply::new(store);

        let mut ctx: RequestContext<(), Agent> = RequestContext::new(());
        ctx.new_state = Some(agent("", "reviewer"));
        step.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.should_create, Some(false));
        assert!(ctx.existing.is_some());

        let mut ctx: RequestContext<(), Agent> = RequestContext::new(());
        ctx.new_state = Some(agent("", "newcomer"));
        step.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.should_create, Some(true));
        assert!(ctx.existing.is_none());
    }
}
