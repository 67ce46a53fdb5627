//! Shared controller machinery: dependency bundle, per-kind base with
//! the standard pipelines, and the Apply delegation lookup.

use std::sync::Arc;

use async_trait::async_trait;
use stigmer_api::Resource;
use stigmer_api::v1::{ApiResourceId, ApiResourceReference};
use stigmer_core::{Clock, IdGenerator, Validate};
use stigmer_pipeline::steps::{
    BuildNewState, BuildUpdateState, CheckDuplicate, DeleteResource, ExtractResourceId,
    LoadByReference, LoadExisting, LoadExistingForDelete, LoadForApply, Persist, ResolveSlug,
    ValidateRequest,
};
use stigmer_pipeline::{Pipeline, PipelineError, RequestContext, Step};
use stigmer_store::{KvStore, TypedStore};

/// Dependencies shared by every controller.
#[derive(Clone)]
pub struct ControllerDeps {
    /// The process-wide store handle.
    pub kv: Arc<dyn KvStore>,
    /// The process-wide id generator.
    pub ids: Arc<IdGenerator>,
    /// Clock for audit stamping.
    pub clock: Arc<dyn Clock>,
}

impl ControllerDeps {
    /// Bundle the shared handles.
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>, ids: Arc<IdGenerator>, clock: Arc<dyn Clock>) -> Self {
        Self { kv, ids, clock }
    }
}

impl std::fmt::Debug for ControllerDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerDeps").finish_non_exhaustive()
    }
}

/// Resolves the target id by slug when an update request carries no id
/// (the Apply delegation path).
pub(crate) struct ResolveIdBySlug<R> {
    store: TypedStore<R>,
}

impl<R: Resource> ResolveIdBySlug<R> {
    pub(crate) fn new(store: TypedStore<R>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<R: Resource> Step<R, R> for ResolveIdBySlug<R> {
    fn name(&self) -> &'static str {
        "resolve_id_by_slug"
    }

    async fn execute(&self, ctx: &mut RequestContext<R, R>) -> Result<(), PipelineError> {
        let state = ctx
            .new_state
            .as_ref()
            .ok_or_else(|| PipelineError::internal("new state missing"))?;
        if !state.id().is_empty() {
            ctx.resource_id = Some(state.id().to_string());
            return Ok(());
        }
        let (org, slug) = (state.org(), state.slug());
        let id = self.store.resolve_slug(org, slug).await?.ok_or_else(|| {
            PipelineError::not_found(format!("{} {slug:?} not found in org {org:?}", R::KIND))
        })?;
        ctx.resource_id = Some(id);
        Ok(())
    }
}

/// Per-kind base: the typed store plus the standard command and query
/// pipelines. Kind-specific controllers compose around these.
pub struct Base<R> {
    /// The kind's typed store view.
    pub store: TypedStore<R>,
    /// Shared handles.
    pub deps: ControllerDeps,
}

impl<R> Base<R>
where
    R: Resource + Validate,
{
    /// Create the base over the shared store handle.
    #[must_use]
    pub fn new(deps: ControllerDeps) -> Self {
        Self {
            store: TypedStore::new(Arc::clone(&deps.kv)),
            deps,
        }
    }

    fn take_new_state(ctx: RequestContext<R, R>) -> Result<R, PipelineError> {
        ctx.new_state
            .ok_or_else(|| PipelineError::internal("pipeline produced no state"))
    }

    /// Standard create: validate, derive slug, stamp identity, reject
    /// duplicates, persist.
    pub async fn create(&self, request: R) -> Result<R, PipelineError> {
        let pipeline: Pipeline<R, R> = Pipeline::new()
            .add_step(ValidateRequest::new())
            .add_step(ResolveSlug)
            .add_step(BuildNewState::new(
                Arc::clone(&self.deps.ids),
                Arc::clone(&self.deps.clock),
            ))
            .add_step(CheckDuplicate::new(self.store.clone()))
            .add_step(Persist::new(self.store.clone()));

        let mut ctx = RequestContext::new(request);
        pipeline.execute(&mut ctx).await?;
        Self::take_new_state(ctx)
    }

    /// Standard update: validate, locate the stored resource (by id or
    /// slug), carry identity forward, persist with the version CAS.
    pub async fn update(&self, request: R) -> Result<R, PipelineError> {
        let pipeline: Pipeline<R, R> = Pipeline::new()
            .add_step(ValidateRequest::new())
            .add_step(ResolveSlug)
            .add_step(ResolveIdBySlug::new(self.store.clone()))
            .add_step(LoadExisting::new(self.store.clone()))
            .add_step(BuildUpdateState::new(Arc::clone(&self.deps.clock)))
            .add_step(Persist::new(self.store.clone()));

        let mut ctx = RequestContext::new(request);
        pipeline.execute(&mut ctx).await?;
        Self::take_new_state(ctx)
    }

    /// Apply lookup: validate, derive the slug, and decide whether the
    /// request creates or updates. The caller then delegates to its own
    /// create/update path, re-including any kind-specific steps.
    pub async fn should_create(&self, request: &R) -> Result<bool, PipelineError> {
        let pipeline: Pipeline<R, R> = Pipeline::new()
            .add_step(ValidateRequest::new())
            .add_step(ResolveSlug)
            .add_step(LoadForApply::new(self.store.clone()));

        let mut ctx = RequestContext::new(request.clone());
        pipeline.execute(&mut ctx).await?;
        ctx.should_create
            .ok_or_else(|| PipelineError::internal("apply lookup produced no decision"))
    }

    /// Standard idempotent delete.
    pub async fn delete(&self, request: ApiResourceId) -> Result<R, PipelineError> {
        let id = request.value.clone();
        let pipeline: Pipeline<ApiResourceId, R> = Pipeline::new()
            .add_step(ValidateRequest::new())
            .add_step(ExtractResourceId::new())
            .add_step(LoadExistingForDelete::new(self.store.clone()))
            .add_step(DeleteResource::new(
                self.store.clone(),
                Arc::clone(&self.deps.clock),
            ));

        let mut ctx = RequestContext::new(request);
        pipeline.execute(&mut ctx).await?;
        Ok(ctx.existing.unwrap_or_else(|| {
            // Second delete of the same id: answer with the bare id.
            let mut gone = R::default();
            gone.meta_mut().id = id;
            gone
        }))
    }

    /// Standard get by id.
    pub async fn get(&self, request: ApiResourceId) -> Result<R, PipelineError> {
        self.get_with_extract(request, ExtractResourceId::new()).await
    }

    /// Get for kinds keyed by another kind's id (ExecutionContext).
    pub async fn get_any_kind(&self, request: ApiResourceId) -> Result<R, PipelineError> {
        self.get_with_extract(request, ExtractResourceId::any_kind()).await
    }

    async fn get_with_extract(
        &self,
        request: ApiResourceId,
        extract: ExtractResourceId,
    ) -> Result<R, PipelineError> {
        let pipeline: Pipeline<ApiResourceId, R> = Pipeline::new()
            .add_step(ValidateRequest::new())
            .add_step(extract)
            .add_step(LoadExisting::new(self.store.clone()));

        let mut ctx = RequestContext::new(request);
        pipeline.execute(&mut ctx).await?;
        ctx.existing
            .ok_or_else(|| PipelineError::internal("load step produced no resource"))
    }

    /// Standard get by `{org, slug}` reference.
    pub async fn get_by_reference(
        &self,
        request: ApiResourceReference,
    ) -> Result<R, PipelineError> {
        let pipeline: Pipeline<ApiResourceReference, R> = Pipeline::new()
            .add_step(ValidateRequest::new())
            .add_step(LoadByReference::new(self.store.clone()));

        let mut ctx = RequestContext::new(request);
        pipeline.execute(&mut ctx).await?;
        ctx.existing
            .ok_or_else(|| PipelineError::internal("load step produced no resource"))
    }

    /// List resources, optionally filtered by org.
    pub async fn list(&self, org: &str) -> Result<Vec<R>, PipelineError> {
        let filter = if org.is_empty() { None } else { Some(org) };
        self.store.list(filter).await.map_err(Into::into)
    }
}

impl<R> std::fmt::Debug for Base<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Base").finish_non_exhaustive()
    }
}
