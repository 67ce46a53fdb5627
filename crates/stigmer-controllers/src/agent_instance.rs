//! AgentInstance controller.
//!
//! Create/update verify that `agent_ref` and every `environment_refs`
//! entry resolve — through the loopback, so the referenced kinds'
//! controllers stay the single authority for their reads.

use std::sync::Arc;

use async_trait::async_trait;
use stigmer_api::Resource;
use stigmer_api::v1::agent_instance_command_controller_server::AgentInstanceCommandController as AgentInstanceCommandApi;
use stigmer_api::v1::agent_instance_query_controller_server::AgentInstanceQueryController as AgentInstanceQueryApi;
use stigmer_api::v1::agent_query_controller_client::AgentQueryControllerClient;
use stigmer_api::v1::environment_query_controller_client::EnvironmentQueryControllerClient;
use stigmer_api::v1::{
    AgentInstance, AgentInstanceList, ApiResourceId, ApiResourceKind, ApiResourceReference,
    ListResourcesRequest,
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

/// Verifies the instance's references resolve.
struct CheckReferences {
    agents: AgentQueryControllerClient<Channel>,
    environments: EnvironmentQueryControllerClient<Channel>,
}

#[async_trait]
impl Step<AgentInstance, AgentInstance> for CheckReferences {
    fn name(&self) -> &'static str {
        "check_references"
    }

    async fn execute(
        &self,
        ctx: &mut RequestContext<AgentInstance, AgentInstance>,
    ) -> Result<(), PipelineError> {
        let org = ctx.request().org().to_string();
        let spec = ctx
            .request()
            .spec
            .clone()
            .ok_or_else(|| PipelineError::invalid_argument("spec must be set"))?;

        self.agents
            .clone()
            .get_by_reference(reference_for(ApiResourceKind::Agent, &org, &spec.agent_ref))
            .await
            .map_err(|s| resolve_failure(s, ApiResourceKind::Agent, &spec.agent_ref))?;

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

/// Serves AgentInstanceCommandController and AgentInstanceQueryController.
#[derive(Debug)]
pub struct AgentInstanceController {
    base: Base<AgentInstance>,
    agents: Downstream<AgentQueryControllerClient<Channel>>,
    environments: Downstream<EnvironmentQueryControllerClient<Channel>>,
}

impl AgentInstanceController {
    /// Create the controller; downstream clients are injected later.
    #[must_use]
    pub fn new(deps: ControllerDeps) -> Self {
        Self {
            base: Base::new(deps),
            agents: Downstream::new("agent-query"),
            environments: Downstream::new("environment-query"),
        }
    }

    /// Inject the agent query client.
    pub fn set_agent_client(&self, client: AgentQueryControllerClient<Channel>) {
        self.agents.set(client);
    }

    /// Inject the environment query client.
    pub fn set_environment_client(&self, client: EnvironmentQueryControllerClient<Channel>) {
        self.environments.set(client);
    }

    fn check_references_step(&self) -> Result<CheckReferences, PipelineError> {
        Ok(CheckReferences {
            agents: self.agents.get()?,
            environments: self.environments.get()?,
        })
    }

    async fn do_create(&self, request: AgentInstance) -> Result<AgentInstance, PipelineError> {
        let pipeline: Pipeline<AgentInstance, AgentInstance> = Pipeline::new()
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

    async fn do_update(&self, request: AgentInstance) -> Result<AgentInstance, PipelineError> {
        let pipeline: Pipeline<AgentInstance, AgentInstance> = Pipeline::new()
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
impl AgentInstanceCommandApi for AgentInstanceController {
    async fn apply(
        &self,
        request: Request<AgentInstance>,
    ) -> Result<Response<AgentInstance>, Status> {
        let instance = request.into_inner();
        let result = match self.base.should_create(&instance).await {
            Ok(true) => self.do_create(instance).await,
            Ok(false) => self.do_update(instance).await,
            Err(err) => Err(err),
        };
        respond(result, ApiResourceKind::AgentInstance, "apply")
    }

    async fn create(
        &self,
        request: Request<AgentInstance>,
    ) -> Result<Response<AgentInstance>, Status> {
        respond(
            self.do_create(request.into_inner()).await,
            ApiResourceKind::AgentInstance,
            "create",
        )
    }

    async fn update(
        &self,
        request: Request<AgentInstance>,
    ) -> Result<Response<AgentInstance>, Status> {
        respond(
            self.do_update(request.into_inner()).await,
            ApiResourceKind::AgentInstance,
            "update",
        )
    }

    async fn delete(
        &self,
        request: Request<ApiResourceId>,
    ) -> Result<Response<AgentInstance>, Status> {
        respond(
            self.base.delete(request.into_inner()).await,
            ApiResourceKind::AgentInstance,
            "delete",
        )
    }
}

#[tonic::async_trait]
impl AgentInstanceQueryApi for AgentInstanceController {
    async fn get(
        &self,
        request: Request<ApiResourceId>,
    ) -> Result<Response<AgentInstance>, Status> {
        respond(
            self.base.get(request.into_inner()).await,
            ApiResourceKind::AgentInstance,
            "get",
        )
    }

    async fn get_by_reference(
        &self,
        request: Request<ApiResourceReference>,
    ) -> Result<Response<AgentInstance>, Status> {
        respond(
            self.base.get_by_reference(request.into_inner()).await,
            ApiResourceKind::AgentInstance,
            "get_by_reference",
        )
    }

    async fn list(
        &self,
        request: Request<ListResourcesRequest>,
    ) -> Result<Response<AgentInstanceList>, Status> {
        let result = self
            .base
            .list(&request.into_inner().org)
            .await
            .map(|items| AgentInstanceList { items });
        respond(result, ApiResourceKind::AgentInstance, "list")
    }
}
