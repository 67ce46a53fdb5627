//! Agent controller.
//!
//! Create persists the template, then creates its default AgentInstance
//! through the injected command client (the full validated path) and
//! patches `status.default_instance_id`. The first write uses the same
//! id on retry, so the two-write sequence is idempotent; if the instance
//! write fails the agent write is compensated away and no partial state
//! remains.

use std::sync::Arc;

use async_trait::async_trait;
use stigmer_api::Resource;
use stigmer_api::v1::agent_command_controller_server::AgentCommandController as AgentCommandApi;
use stigmer_api::v1::agent_instance_command_controller_client::AgentInstanceCommandControllerClient;
use stigmer_api::v1::agent_query_controller_client::AgentQueryControllerClient;
use stigmer_api::v1::agent_query_controller_server::AgentQueryController as AgentQueryApi;
use stigmer_api::v1::{
    Agent, AgentInstance, AgentInstanceSpec, AgentList, AgentStatus, ApiResourceId,
    ApiResourceKind, ApiResourceMetadata, ApiResourceReference, ListResourcesRequest, sub_agent,
};
use stigmer_pipeline::{PipelineError, RequestContext, Step};
use tonic::transport::Channel;
use tonic::{Request, Response, Status};
use tracing::warn;

use crate::base::{Base, ControllerDeps};
use crate::boundary::respond;
use crate::downstream::Downstream;
use crate::refs::{reference_for, resolve_failure};

/// Maximum depth of a sub-agent reference chain before it is treated as
/// a cycle.
const MAX_SUB_AGENT_DEPTH: usize = 8;

/// Rejects sub-agent reference chains deeper than the bound (cycles are
/// indistinguishable from over-deep chains at this depth).
struct CheckSubAgentCycles {
    agents: AgentQueryControllerClient<Channel>,
}

type BoxCheck<'a> =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), PipelineError>> + Send + 'a>>;

impl CheckSubAgentCycles {
    fn walk<'a>(&'a self, org: &'a str, agent: &'a Agent, depth: usize) -> BoxCheck<'a> {
        Box::pin(async move {
            if depth > MAX_SUB_AGENT_DEPTH {
                return Err(PipelineError::failed_precondition(format!(
                    "sub-agent reference chain exceeds depth {MAX_SUB_AGENT_DEPTH} (possible cycle)"
                )));
            }
            let Some(spec) = &agent.spec else {
                return Ok(());
            };
            for sub in &spec.sub_agents {
                if let Some(sub_agent::Source::Reference(reference)) = &sub.source {
                    let referenced = self
                        .agents
                        .clone()
                        .get_by_reference(reference_for(ApiResourceKind::Agent, org, reference))
                        .await
                        .map_err(|s| resolve_failure(s, ApiResourceKind::Agent, reference))?
                        .into_inner();
                    self.walk(org, &referenced, depth + 1).await?;
                }
            }
            Ok(())
        })
    }
}

#[async_trait]
impl Step<Agent, Agent> for CheckSubAgentCycles {
    fn name(&self) -> &'static str {
        "check_sub_agent_cycles"
    }

    async fn execute(&self, ctx: &mut RequestContext<Agent, Agent>) -> Result<(), PipelineError> {
        let org = ctx.request().org().to_string();
        self.walk(&org, ctx.request(), 1).await
    }
}

/// Serves AgentCommandController and AgentQueryController.
#[derive(Debug)]
pub struct AgentController {
    base: Base<Agent>,
    instances: Downstream<AgentInstanceCommandControllerClient<Channel>>,
    agents: Downstream<AgentQueryControllerClient<Channel>>,
}

impl AgentController {
    /// Create the controller; downstream clients are injected later.
    #[must_use]
    pub fn new(deps: ControllerDeps) -> Self {
        Self {
            base: Base::new(deps),
            instances: Downstream::new("agent-instance-command"),
            agents: Downstream::new("agent-query"),
        }
    }

    /// Inject the AgentInstance command client.
    pub fn set_instance_client(&self, client: AgentInstanceCommandControllerClient<Channel>) {
        self.instances.set(client);
    }

    /// Inject this controller's own query client, used for sub-agent
    /// traversal through the interceptor chain.
    pub fn set_agent_client(&self, client: AgentQueryControllerClient<Channel>) {
        self.agents.set(client);
    }

    async fn check_cycles(&self, request: &Agent) -> Result<(), PipelineError> {
        // Cycles are only reachable through references, so skip the
        // loopback round-trips when the spec has none.
        let has_references = request.spec.as_ref().is_some_and(|spec| {
            spec.sub_agents
                .iter()
                .any(|sub| matches!(sub.source, Some(sub_agent::Source::Reference(_))))
        });
        if !has_references {
            return Ok(());
        }
        let step = CheckSubAgentCycles {
            agents: self.agents.get()?,
        };
        let mut ctx = RequestContext::new(request.clone());
        step.execute(&mut ctx).await
    }

    async fn do_create(&self, request: Agent) -> Result<Agent, PipelineError> {
        self.check_cycles(&request).await?;
        let mut agent = self.base.create(request).await?;

        // Every agent gets exactly one default instance, created through
        // the in-process fabric so instance validation applies.
        let instance = AgentInstance {
            metadata: Some(ApiResourceMetadata {
                name: format!("{}-default", agent.name()),
                org: agent.org().to_string(),
                ..Default::default()
            }),
            spec: Some(AgentInstanceSpec {
                agent_ref: agent.id().to_string(),
                environment_refs: Vec::new(),
                overrides: Default::default(),
            }),
            status: None,
        };

        let mut client = self.instances.get()?;
        let created = match client.create(instance).await {
            Ok(response) => response.into_inner(),
            Err(status) => {
                // Compensate: the agent write never becomes visible.
                if let Err(remove_err) = self.base.store.remove(&agent).await {
                    warn!(
                        agent = agent.id(),
                        error = %remove_err,
                        "failed to roll back agent after default-instance failure"
                    );
                }
                return Err(status.into());
            }
        };

        agent.status = Some(AgentStatus {
            default_instance_id: created.id().to_string(),
        });
        self.base.store.save(&agent).await?;
        Ok(agent)
    }

    async fn do_update(&self, request: Agent) -> Result<Agent, PipelineError> {
        use stigmer_pipeline::steps::{
            BuildUpdateState, LoadExisting, Persist, ResolveSlug, ValidateRequest,
        };
        use stigmer_pipeline::{FnStep, Pipeline};

        self.check_cycles(&request).await?;

        let pipeline: Pipeline<Agent, Agent> = Pipeline::new()
            .add_step(ValidateRequest::new())
            .add_step(ResolveSlug)
            .add_step(crate::base::ResolveIdBySlug::new(self.base.store.clone()))
            .add_step(LoadExisting::new(self.base.store.clone()))
            .add_step(BuildUpdateState::new(Arc::clone(&self.base.deps.clock)))
            // Updates never clobber the default-instance binding.
            .add_step(FnStep::new(
                "preserve_status",
                |ctx: &mut RequestContext<Agent, Agent>| {
                    let stored_status = ctx.existing.as_ref().and_then(|e| e.status.clone());
                    if let Some(state) = ctx.new_state.as_mut() {
                        let missing = state
                            .status
                            .as_ref()
                            .map_or(true, |s| s.default_instance_id.is_empty());
                        if missing {
                            if let Some(status) = stored_status {
                                state.status = Some(status);
                            }
                        }
                    }
                    Ok(())
                },
            ))
            .add_step(Persist::new(self.base.store.clone()));

        let mut ctx = RequestContext::new(request);
        pipeline.execute(&mut ctx).await?;
        ctx.new_state
            .ok_or_else(|| PipelineError::internal("pipeline produced no state"))
    }
}

#[tonic::async_trait]
impl AgentCommandApi for AgentController {
    async fn apply(&self, request: Request<Agent>) -> Result<Response<Agent>, Status> {
        let agent = request.into_inner();
        let result = match self.base.should_create(&agent).await {
            Ok(true) => self.do_create(agent).await,
            Ok(false) => self.do_update(agent).await,
            Err(err) => Err(err),
        };
        respond(result, ApiResourceKind::Agent, "apply")
    }

    async fn create(&self, request: Request<Agent>) -> Result<Response<Agent>, Status> {
        respond(
            self.do_create(request.into_inner()).await,
            ApiResourceKind::Agent,
            "create",
        )
    }

    async fn update(&self, request: Request<Agent>) -> Result<Response<Agent>, Status> {
        respond(
            self.do_update(request.into_inner()).await,
            ApiResourceKind::Agent,
            "update",
        )
    }

    async fn delete(&self, request: Request<ApiResourceId>) -> Result<Response<Agent>, Status> {
        respond(
            self.base.delete(request.into_inner()).await,
            ApiResourceKind::Agent,
            "delete",
        )
    }
}

#[tonic::async_trait]
impl AgentQueryApi for AgentController {
    async fn get(&self, request: Request<ApiResourceId>) -> Result<Response<Agent>, Status> {
        respond(
            self.base.get(request.into_inner()).await,
            ApiResourceKind::Agent,
            "get",
        )
    }

    async fn get_by_reference(
        &self,
        request: Request<ApiResourceReference>,
    ) -> Result<Response<Agent>, Status> {
        respond(
            self.base.get_by_reference(request.into_inner()).await,
            ApiResourceKind::Agent,
            "get_by_reference",
        )
    }

    async fn list(
        &self,
        request: Request<ListResourcesRequest>,
    ) -> Result<Response<AgentList>, Status> {
        let result = self
            .base
            .list(&request.into_inner().org)
            .await
            .map(|items| AgentList { items });
        respond(result, ApiResourceKind::Agent, "list")
    }
}
