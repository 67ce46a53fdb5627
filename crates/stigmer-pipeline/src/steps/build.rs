//! State construction steps for create and update pipelines.

use std::sync::Arc;

use async_trait::async_trait;
use stigmer_api::Resource;
use stigmer_core::Clock;
use stigmer_core::IdGenerator;
use stigmer_core::meta::{advance_metadata, init_metadata};

use crate::{PipelineError, RequestContext, Step};

/// Initializes metadata on the new state: kind-prefixed id, derived slug,
/// `created_at = updated_at = now`, `version = 1`. Seeds the state from
/// the request when no earlier step did.
pub struct BuildNewState {
    ids: Arc<IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl BuildNewState {
    /// Create the step.
    #[must_use]
    pub fn new(ids: Arc<IdGenerator>, clock: Arc<dyn Clock>) -> Self {
        Self { ids, clock }
    }
}

#[async_trait]
impl<R: Resource> Step<R, R> for BuildNewState {
    fn name(&self) -> &'static str {
        "build_new_state"
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
        init_metadata(state, &self.ids, self.clock.as_ref());
        Ok(())
    }
}

/// Carries identity from `ctx.existing` into the new state: preserves
/// `id`, `org` and `created_at`, increments `version`, refreshes
/// `updated_at`.
pub struct BuildUpdateState {
    clock: Arc<dyn Clock>,
}

impl BuildUpdateState {
    /// Create the step.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl<R: Resource> Step<R, R> for BuildUpdateState {
    fn name(&self) -> &'static str {
        "build_update_state"
    }

    async fn execute(&self, ctx: &mut RequestContext<R, R>) -> Result<(), PipelineError> {
        let existing = ctx
            .existing
            .clone()
            .ok_or_else(|| PipelineError::internal("existing resource not loaded"))?;
        if ctx.new_state.is_none() {
            let seeded = ctx.request().clone();
            ctx.new_state = Some(seeded);
        }
        let state = ctx
            .new_state
            .as_mut()
            .ok_or_else(|| PipelineError::internal("new state missing"))?;
        advance_metadata(&existing, state, self.clock.as_ref());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use stigmer_api::v1::{Agent, ApiResourceMetadata};
    use stigmer_core::FixedClock;

    fn deps() -> (Arc<IdGenerator>, Arc<dyn Clock>) {
        (
            Arc::new(IdGenerator::new()),
            Arc::new(FixedClock(Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap())),
        )
    }

    fn named(name: &str) -> Agent {
        Agent {
            metadata: Some(ApiResourceMetadata {
                name: name.to_string(),
                org: "acme".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn build_new_state_stamps_identity() {
        let (ids, clock) = deps();
        let step = BuildNewState::new(ids, clock);
        let mut ctx: RequestContext<Agent, Agent> = RequestContext::new(named("Reviewer"));
        step.execute(&mut ctx).await.unwrap();

        let state = ctx.new_state.as_ref().unwrap();
        assert!(state.id().starts_with("agt-"));
        let audit = state.meta().unwrap().audit.as_ref().unwrap();
        assert_eq!(audit.version, 1);
    }

    #[tokio::test]
    async fn build_update_state_requires_existing() {
        let (_, clock) = deps();
        let step = BuildUpdateState::new(clock);
        let mut ctx: RequestContext<Agent, Agent> = RequestContext::new(named("Reviewer"));
        assert!(step.execute(&mut ctx).await.is_err());
    }

    #[tokio::test]
    async fn build_update_state_bumps_version() {
        let (ids, clock) = deps();
        let create = BuildNewState::new(ids, Arc::clone(&clock));
        let mut ctx: RequestContext<Agent, Agent> = RequestContext::new(named("Reviewer"));
        create.execute(&mut ctx).await.unwrap();
        let existing = ctx.new_state.clone().unwrap();

        let mut ctx: RequestContext<Agent, Agent> = RequestContext::new(named("Reviewer"));
        ctx.existing = Some(existing.clone());
        BuildUpdateState::new(clock).execute(&mut ctx).await.unwrap();

        let updated = ctx.new_state.as_ref().unwrap();
        assert_eq!(updated.id(), existing.id());
        assert_eq!(
            updated.meta().unwrap().audit.as_ref().unwrap().version,
            2
        );
    }
}
