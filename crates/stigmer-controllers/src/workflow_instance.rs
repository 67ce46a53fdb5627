//! WorkflowInstance controller, the workflow-side analogue of
//! AgentInstance.

use std::sync::Arc;

use async_trait::async_trait;
use stigmer_api::Resource;
use stigmer_api::v1::environment_query_controller_client::EnvironmentQueryControllerClient;
use stigmer_api::v1::workflow_instance_command_controller_server::WorkflowInstanceCommandController as WorkflowInstanceCommandApi;
use stigmer_api::v1::workflow_instance_query_controller_server::WorkflowInstanceQueryController as WorkflowInstanceQueryApi;
use stigmer_api::v1::workflow_query_controller_client::WorkflowQueryControllerClient;
use stigmer_api::v1::{
    ApiResourceId, ApiResourceKind, ApiResourceReference, ListResourcesRequest, WorkflowInstance,
    WorkflowInstanceList,
};
use stigmer_pipeline::steps::{
    BuildNewState, BuildUpdateState, CheckDuplicate, LoadExisting, Persist, ResolveSlug,
    ValidateRequest,
};
use stigmer_pipeline::{Pipeline, PipelineError, RequestContext, Step};
use tonic::transport::Channel;
use tonic::{Request, Response, Status};

use crate::base::{Base, ControllerDeps, ResolveIdBySlug};
use crate::boundary::respond;
use crate::downstream::Downstream;
use crate::refs::{reference_for, resolve_failure};

struct CheckReferences {
    workflows: WorkflowQueryControllerClient<Channel>,
    environments: EnvironmentQueryControllerClient<Channel>,
}

#[async_trait]
impl Step<WorkflowInstance, WorkflowInstance> for CheckReferences {
    fn name(&self) -> &'static str {
        "check_references"
    }

    async fn execute(
        &self,
        ctx: &mut RequestContext<WorkflowInstance, WorkflowInstance>,
    ) -> Result<(), PipelineError> {
        let org = ctx.request().org().to_string();
        let spec = ctx
            .request()
            .spec
            .clone()
            .ok_or_else(|| PipelineError::invalid_argument("spec must be set"))?;

        self.workflows
            .clone()
            .get_by_reference(reference_for(
                ApiResourceKind::Workflow,
                &org,
                &spec.workflow_ref,
            ))
            .await
            .map_err(|s| resolve_failure(s, ApiResourceKind::Workflow, &spec.workflow_ref))?;

        for env_ref in &spec.environment_refs {
            self.environments
                .clone()
                .get_by_reference(reference_for(ApiResourceKind::Environment, &org, env_ref))
                .await
                .map_err(|s| resolve_failure(s, ApiResourceKind::Environment, env_ref))?;
        }
        Ok(())
    }
}

/// Serves WorkflowInstanceCommandController and WorkflowInstanceQueryController.
#[derive(Debug)]
pub struct WorkflowInstanceController {
    base: Base<WorkflowInstance>,
    workflows: Downstream<WorkflowQueryControllerClient<Channel>>,
    environments: Downstream<EnvironmentQueryControllerClient<Channel>>,
}

impl WorkflowInstanceController {
    /// Create the controller; downstream clients are injected later.
    #[must_use]
    pub fn new(deps: ControllerDeps) -> Self {
        Self {
            base: Base::new(deps),
            workflows: Downstream::new("workflow-query"),
            environments: Downstream::new("environment-query"),
        }
    }

    /// Inject the workflow query client.
    pub fn set_workflow_client(&self, client: WorkflowQueryControllerClient<Channel>) {
        self.workflows.set(client);
    }

    /// Inject the environment query client.
    pub fn set_environment_client(&self, client: EnvironmentQueryControllerClient<Channel>) {
        self.environments.set(client);
    }

    fn check_references_step(&self) -> Result<CheckReferences, PipelineError> {
        Ok(CheckReferences {
            workflows: self.workflows.get()?,
            environments: self.environments.get()?,
        })
    }

    async fn do_create(
        &self,
        request: WorkflowInstance,
    ) -> Result<WorkflowInstance, PipelineError> {
        let pipeline: Pipeline<WorkflowInstance, WorkflowInstance> = Pipeline::new()
            .add_step(ValidateRequest::new())
            .add_step(self.check_references_step()?)
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

    async fn do_update(
        &self,
        request: WorkflowInstance,
    ) -> Result<WorkflowInstance, PipelineError> {
        let pipeline: Pipeline<WorkflowInstance, WorkflowInstance> = Pipeline::new()
            .add_step(ValidateRequest::new())
            .add_step(self.check_references_step()?)
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
impl WorkflowInstanceCommandApi for WorkflowInstanceController {
    async fn apply(
        &self,
        request: Request<WorkflowInstance>,
    ) -> Result<Response<WorkflowInstance>, Status> {
        let instance = request.into_inner();
        let result = match self.base.should_create(&instance).await {
            Ok(true) => self.do_create(instance).await,
            Ok(false) => self.do_update(instance).await,
            Err(err) => Err(err),
        };
        respond(result, ApiResourceKind::WorkflowInstance, "apply")
    }

    async fn create(
        &self,
        request: Request<WorkflowInstance>,
    ) -> Result<Response<WorkflowInstance>, Status> {
        respond(
            self.do_create(request.into_inner()).await,
            ApiResourceKind::WorkflowInstance,
            "create",
        )
    }

    async fn update(
        &self,
        request: Request<WorkflowInstance>,
    ) -> Result<Response<WorkflowInstance>, Status> {
        respond(
            self.do_update(request.into_inner()).await,
            ApiResourceKind::WorkflowInstance,
            "update",
        )
    }

    async fn delete(
        &self,
        request: Request<ApiResourceId>,
    ) -> Result<Response<WorkflowInstance>, Status> {
        respond(
            self.base.delete(request.into_inner()).await,
            ApiResourceKind::WorkflowInstance,
            "delete",
        )
    }
}

#[tonic::async_trait]
impl WorkflowInstanceQueryApi for WorkflowInstanceController {
    async fn get(
        &self,
        request: Request<ApiResourceId>,
    ) -> Result<Response<WorkflowInstance>, Status> {
        respond(
            self.base.get(request.into_inner()).await,
            ApiResourceKind::WorkflowInstance,
            "get",
        )
    }

    async fn get_by_reference(
        &self,
        request: Request<ApiResourceReference>,
    ) -> Result<Response<WorkflowInstance>, Status> {
        respond(
            self.base.get_by_reference(request.into_inner()).await,
            ApiResourceKind::WorkflowInstance,
            "get_by_reference",
        )
    }

    async fn list(
        &self,
        request: Request<ListResourcesRequest>,
    ) -> Result<Response<WorkflowInstanceList>, Status> {
        let result = self
            .base
            .list(&request.into_inner().org)
            .await
            .map(|items| WorkflowInstanceList { items });
        respond(result, ApiResourceKind::WorkflowInstance, "list")
    }
}
