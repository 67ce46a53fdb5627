//! Workflow controller.
//!
//! Create and update run the engine-backed spec validation right after
//! request validation, so a template that the workflow engine cannot
//! parse never persists.

use std::sync::{Arc, OnceLock};

use stigmer_api::v1::workflow_command_controller_server::WorkflowCommandController as WorkflowCommandApi;
use stigmer_api::v1::workflow_query_controller_server::WorkflowQueryController as WorkflowQueryApi;
use stigmer_api::v1::{
    ApiResourceId, ApiResourceKind, ApiResourceReference, ListResourcesRequest, Workflow,
    WorkflowList,
};
use stigmer_pipeline::steps::{
    BuildNewState, BuildUpdateState, CheckDuplicate, LoadExisting, Persist, ResolveSlug,
    ValidateRequest, ValidateWorkflowSpec,
};
use stigmer_pipeline::{Pipeline, PipelineError, RequestContext, WorkflowSpecValidator};
use tonic::{Request, Response, Status};

use crate::base::{Base, ControllerDeps, ResolveIdBySlug};
use crate::boundary::respond;

/// Serves WorkflowCommandController and WorkflowQueryController.
pub struct WorkflowController {
    base: Base<Workflow>,
    validator: OnceLock<Arc<dyn WorkflowSpecValidator>>,
}

impl std::fmt::Debug for WorkflowController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowController").finish_non_exhaustive()
    }
}

impl WorkflowController {
    /// Create the controller; the validator is injected during wiring.
    #[must_use]
    pub fn new(deps: ControllerDeps) -> Self {
        Self {
            base: Base::new(deps),
            validator: OnceLock::new(),
        }
    }

    /// Inject the engine-backed spec validator. Never called when
    /// Temporal is degraded; the validation step then skips with a
    /// warning.
    pub fn set_spec_validator(&self, validator: Arc<dyn WorkflowSpecValidator>) {
        let _ = self.validator.set(validator);
    }

    async fn do_create(&self, request: Workflow) -> Result<Workflow, PipelineError> {
        let pipeline: Pipeline<Workflow, Workflow> = Pipeline::new()
            .add_step(ValidateRequest::new())
            .add_step(ValidateWorkflowSpec::new(self.validator.get().cloned()))
            .add_step(ResolveSlug)
            .add_step(BuildNewState::new(
                Arc::clone(&self.base.deps.ids),
                Arc::clone(&self.base.deps.clock),
            ))
            .add_step(CheckDuplicate::new(self.base.store.clone()))
            .add_step(Persist::new(self.base.store.clone()));

        let mut ctx = RequestContext::new(request);
        pipeline.execute(&mut ctx).await?;
        ctx.new_state
            .ok_or_else(|| PipelineError::internal("pipeline produced no state"))
    }

    async fn do_update(&self, request: Workflow) -> Result<Workflow, PipelineError> {
        let pipeline: Pipeline<Workflow, Workflow> = Pipeline::new()
            .add_step(ValidateRequest::new())
            .add_step(ValidateWorkflowSpec::new(self.validator.get().cloned()))
            .add_step(ResolveSlug)
            .add_step(ResolveIdBySlug::new(self.base.store.clone()))
            .add_step(LoadExisting::new(self.base.store.clone()))
            .add_step(BuildUpdateState::new(Arc::clone(&self.base.deps.clock)))
            .add_step(Persist::new(self.base.store.clone()));

        let mut ctx = RequestContext::new(request);
        pipeline.execute(&mut ctx).await?;
        ctx.new_state
            .ok_or_else(|| PipelineError::internal("pipeline produced no state"))
    }
}

#[tonic::async_trait]
impl WorkflowCommandApi for WorkflowController {
    async fn apply(&self, request: Request<Workflow>) -> Result<Response<Workflow>, Status> {
        let workflow = request.into_inner();
        let result = match self.base.should_create(&workflow).await {
            Ok(true) => self.do_create(workflow).await,
            Ok(false) => self.do_update(workflow).await,
            Err(err) => Err(err),
        };
        respond(result, ApiResourceKind::Workflow, "apply")
    }

    async fn create(&self, request: Request<Workflow>) -> Result<Response<Workflow>, Status> {
        respond(
            self.do_create(request.into_inner()).await,
            ApiResourceKind::Workflow,
            "create",
        )
    }

    async fn update(&self, request: Request<Workflow>) -> Result<Response<Workflow>, Status> {
        respond(
            self.do_update(request.into_inner()).await,
            ApiResourceKind::Workflow,
            "update",
        )
    }

    async fn delete(&self, request: Request<ApiResourceId>) -> Result<Response<Workflow>, Status> {
        respond(
            self.base.delete(request.into_inner()).await,
            ApiResourceKind::Workflow,
            "delete",
        )
    }
}

#[tonic::async_trait]
impl WorkflowQueryApi for WorkflowController {
    async fn get(&self, request: Request<ApiResourceId>) -> Result<Response<Workflow>, Status> {
        respond(
            self.base.get(request.into_inner()).await,
            ApiResourceKind::Workflow,
            "get",
        )
    }

    async fn get_by_reference(
        &self,
        request: Request<ApiResourceReference>,
    ) -> Result<Response<Workflow>, Status> {
        respond(
            self.base.get_by_reference(request.into_inner()).await,
            ApiResourceKind::Workflow,
            "get_by_reference",
        )
    }

    async fn list(
        &self,
        request: Request<ListResourcesRequest>,
    ) -> Result<Response<WorkflowList>, Status> {
        let result = self
            .base
            .list(&request.into_inner().org)
            .await
            .map(|items| WorkflowList { items });
        respond(result, ApiResourceKind::Workflow, "list")
    }
}
