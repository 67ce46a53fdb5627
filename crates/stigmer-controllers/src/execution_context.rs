//! ExecutionContext controller.
//!
//! Internal kind owned by this controller alone: execution pipelines
//! create contexts through the loopback, runners read them at activity
//! entry, and the status subresource path deletes them on terminal
//! phases (with the TTL sweeper as backstop). Keyed by the owning
//! execution's id.

use stigmer_api::Resource;
use stigmer_api::v1::execution_context_command_controller_server::ExecutionContextCommandController as ExecutionContextCommandApi;
use stigmer_api::v1::execution_context_query_controller_server::ExecutionContextQueryController as ExecutionContextQueryApi;
use stigmer_api::v1::{ApiResourceId, ApiResourceKind, ExecutionContext};
use stigmer_pipeline::steps::{
    DeleteResource, ExtractResourceId, LoadExistingForDelete, Persist, ValidateRequest,
};
use stigmer_pipeline::{FnStep, Pipeline, PipelineError, RequestContext};
use tonic::{Request, Response, Status};

use crate::base::{Base, ControllerDeps};
use crate::boundary::respond;

/// Serves ExecutionContextCommandController and
/// ExecutionContextQueryController.
#[derive(Debug)]
pub struct ExecutionContextController {
    base: Base<ExecutionContext>,
}

impl ExecutionContextController {
    /// Create the controller.
    #[must_use]
    pub fn new(deps: ControllerDeps) -> Self {
        Self {
            base: Base::new(deps),
        }
    }

    async fn do_create(
        &self,
        request: ExecutionContext,
    ) -> Result<ExecutionContext, PipelineError> {
        let clock = std::sync::Arc::clone(&self.base.deps.clock);
        let pipeline: Pipeline<ExecutionContext, ExecutionContext> = Pipeline::new()
            .add_step(ValidateRequest::new())
            .add_step(FnStep::new(
                "key_by_execution",
                move |ctx: &mut RequestContext<ExecutionContext, ExecutionContext>| {
                    let mut state = ctx.request().clone();
                    let execution_id = state
                        .spec
                        .as_ref()
                        .map_or(String::new(), |s| s.execution_id.clone());
                    let now = clock.now_rfc3339();
                    let meta = state.meta_mut();
                    meta.id = execution_id.clone();
                    if meta.name.is_empty() {
                        meta.name = execution_id;
                    }
                    meta.audit = Some(stigmer_api::v1::AuditFields {
                        created_at: now.clone(),
                        updated_at: now,
                        version: 1,
                    });
                    ctx.new_state = Some(state);
                    Ok(())
                },
            ))
            .add_step(Persist::new(self.base.store.clone()));

        let mut ctx = RequestContext::new(request);
        pipeline.execute(&mut ctx).await?;
        ctx.new_state
            .ok_or_else(|| PipelineError::internal("pipeline produced no state"))
    }

    async fn do_delete(&self, request: ApiResourceId) -> Result<ExecutionContext, PipelineError> {
        let id = request.value.clone();
        let pipeline: Pipeline<ApiResourceId, ExecutionContext> = Pipeline::new()
            .add_step(ValidateRequest::new())
            // Contexts are keyed by the owning execution's id, so the
            // kind-prefix check does not apply.
            .add_step(ExtractResourceId::any_kind())
            .add_step(LoadExistingForDelete::new(self.base.store.clone()))
            .add_step(DeleteResource::new(
                self.base.store.clone(),
                std::sync::Arc::clone(&self.base.deps.clock),
            ));

        let mut ctx = RequestContext::new(request);
        pipeline.execute(&mut ctx).await?;
        Ok(ctx.existing.unwrap_or_else(|| {
            let mut gone = ExecutionContext::default();
            gone.meta_mut().id = id;
            gone
        }))
    }
}

#[tonic::async_trait]
impl ExecutionContextCommandApi for ExecutionContextController {
    async fn create(
        &self,
        request: Request<ExecutionContext>,
    ) -> Result<Response<ExecutionContext>, Status> {
        respond(
            self.do_create(request.into_inner()).await,
            ApiResourceKind::ExecutionContext,
            "create",
        )
    }

    async fn delete(
        &self,
        request: Request<ApiResourceId>,
    ) -> Result<Response<ExecutionContext>, Status> {
        respond(
            self.do_delete(request.into_inner()).await,
            ApiResourceKind::ExecutionContext,
            "delete",
        )
    }
}

#[tonic::async_trait]
impl ExecutionContextQueryApi for ExecutionContextController {
    async fn get(
        &self,
        request: Request<ApiResourceId>,
    ) -> Result<Response<ExecutionContext>, Status> {
        respond(
            self.base.get_any_kind(request.into_inner()).await,
            ApiResourceKind::ExecutionContext,
            "get",
        )
    }
}
