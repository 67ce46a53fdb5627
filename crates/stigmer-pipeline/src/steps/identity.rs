//! Id extraction, slug resolution, and duplicate detection.

use async_trait::async_trait;
use stigmer_api::Resource;
use stigmer_api::v1::ApiResourceId;
use stigmer_core::id::id_matches_kind;
use stigmer_core::slugify;
use stigmer_store::TypedStore;

use crate::{PipelineError, RequestContext, Step};

/// Puts the stringified id from a wrapped-id request into the context.
pub struct ExtractResourceId {
    check_kind: bool,
}

impl ExtractResourceId {
    /// Extract and verify the id prefix matches the pipeline's kind.
    #[must_use]
    pub fn new() -> Self {
        Self { check_kind: true }
    }

    /// Extract without the prefix check. Used by ExecutionContext, which
    /// is keyed by the owning execution's id.
    #[must_use]
    pub fn any_kind() -> Self {
        Self { check_kind: false }
    }
}

impl Default for ExtractResourceId {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Resource> Step<ApiResourceId, R> for ExtractResourceId {
    fn name(&self) -> &'static str {
        "extract_resource_id"
    }

    async fn execute(
        &self,
        ctx: &mut RequestContext<ApiResourceId, R>,
    ) -> Result<(), PipelineError> {
        let id = ctx.request().value.clone();
        if self.check_kind && !id_matches_kind(&id, R::KIND) {
            return Err(PipelineError::invalid_argument(format!(
                "id {id:?} is not a {} id (expected prefix {:?})",
                R::KIND,
                R::KIND.id_prefix()
            )));
        }
        ctx.resource_id = Some(id);
        Ok(())
    }
}

/// Derives the slug from the resource name and writes it into metadata.
/// Seeds `new_state` from the request when no earlier step did.
pub struct ResolveSlug;

#[async_trait]
impl<R: Resource> Step<R, R> for ResolveSlug {
    fn name(&self) -> &'static str {
        "resolve_slug"
    }

    async fn execute(&self, ctx: &mut RequestContext<R, R>) -> Result<(), PipelineError> {
        if ctx.new_state.is_none() {
            let seeded = ctx.request().clone();
            ctx.new_state = Some(seeded);
        }
        let state = ctx
            .new_state
            .as_mut()
            .ok_or_else(|| PipelineError::internal("new state missing"))?;
        let meta = state.meta_mut();
        let slug = slugify(&meta.name);
        if slug.is_empty() {
            return Err(PipelineError::invalid_argument(format!(
                "name {:?} does not produce a usable slug",
                meta.name
            )));
        }
        meta.slug = slug;
        Ok(())
    }
}

/// Fails with `ALREADY_EXISTS` when another resource of the same kind
/// holds the `{org, slug}` pair.
pub struct CheckDuplicate<R> {
    store: TypedStore<R>,
}

impl<R: Resource> CheckDuplicate<R> {
    /// Create the step over the kind's typed store.
    #[must_use]
    pub fn new(store: TypedStore<R>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<Req: Send + Sync, R: Resource> Step<Req, R> for CheckDuplicate<R> {
    fn name(&self) -> &'static str {
        "check_duplicate"
    }

    async fn execute(&self, ctx: &mut RequestContext<Req, R>) -> Result<(), PipelineError> {
        let state = ctx
            .new_state
            .as_ref()
            .ok_or_else(|| PipelineError::internal("new state missing"))?;
        let (org, slug, id) = (state.org(), state.slug(), state.id());

        if let Some(existing_id) = self.store.resolve_slug(org, slug).await? {
            if existing_id != id {
                return Err(PipelineError::already_exists(format!(
                    "{} {slug:?} already exists in org {org:?} as {existing_id}",
                    R::KIND
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use stigmer_api::v1::{Agent, ApiResourceMetadata};
    use stigmer_core::ErrorKind;
    use stigmer_store::MemoryKvStore;

    fn agent(id: &str, name: &str, slug: &str) -> Agent {
        Agent {
            metadata: Some(ApiResourceMetadata {
                id: id.to_string(),
                name: name.to_string(),
                slug: slug.to_string(),
                org: "acme".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn extract_checks_prefix() {
        let step = ExtractResourceId::new();
        let mut ctx: RequestContext<ApiResourceId, Agent> = RequestContext::new(ApiResourceId {
            value: "wfl-01J8".to_string(),
        });
        let err = Step::<ApiResourceId, Agent>::execute(&step, &mut ctx).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);

        let step = ExtractResourceId::any_kind();
        let mut ctx: RequestContext<ApiResourceId, Agent> = RequestContext::new(ApiResourceId {
            value: "wfl-01J8".to_string(),
        });
        Step::<ApiResourceId, Agent>::execute(&step, &mut ctx).await.unwrap();
        assert_eq!(ctx.resource_id.as_deref(), Some("wfl-01J8"));
    }

    #[tokio::test]
    async fn resolve_slug_seeds_and_derives() {
        let mut ctx: RequestContext<Agent, Agent> =
            RequestContext::new(agent("", "PR Reviewer", ""));
        ResolveSlug.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.new_state.as_ref().unwrap().slug(), "pr-reviewer");
    }

    #[tokio::test]
    async fn duplicate_slug_rejected_same_id_allowed() {
        let store: TypedStore<Agent> = TypedStore::new(Arc::new(MemoryKvStore::new()));
        store.save(&agent("agt-1", "reviewer", "reviewer")).await.unwrap();
        let step = CheckDuplicate::new(store);

        // Same slug, different id: rejected.
        let mut ctx: RequestContext<Agent, Agent> = RequestContext::new(Agent::default());
        ctx.new_state = Some(agent("agt-2", "Reviewer", "reviewer"));
        let err = step.execute(&mut ctx).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::AlreadyExists);

        // Same slug, same id (update path): allowed.
        let mut ctx: RequestContext<Agent, Agent> = RequestContext::new(Agent::default());
        ctx.new_state = Some(agent("agt-1", "reviewer", "reviewer"));
        step.execute(&mut ctx).await.unwrap();
    }
}
