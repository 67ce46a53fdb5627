//! AgentExecution controller.
//!
//! The create pipeline resolves the bound instance and its environments
//! through the loopback, merges the environment layers (decrypting
//! secrets), persists the merged map as an ExecutionContext, auto-creates
//! a session when the caller omitted one, persists the execution with
//! phase PENDING, and finally starts the Temporal workflow with the
//! execution id as the only input. The status subresource enforces the
//! forward-only phase machine and tears the ExecutionContext down on
//! terminal phases.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use stigmer_api::v1::agent_execution_command_controller_server::AgentExecutionCommandController as AgentExecutionCommandApi;
use stigmer_api::v1::agent_execution_query_controller_server::AgentExecutionQueryController as AgentExecutionQueryApi;
use stigmer_api::v1::agent_instance_query_controller_client::AgentInstanceQueryControllerClient;
use stigmer_api::v1::agent_query_controller_client::AgentQueryControllerClient;
use stigmer_api::v1::environment_query_controller_client::EnvironmentQueryControllerClient;
use stigmer_api::v1::execution_context_command_controller_client::ExecutionContextCommandControllerClient;
use stigmer_api::v1::session_command_controller_client::SessionCommandControllerClient;
use stigmer_api::v1::{
    Agent, AgentExecution, AgentExecutionList, AgentInstance, ApiResourceId, ApiResourceKind,
    ApiResourceMetadata, ApiResourceReference, EnvVarValue, Environment, ExecutionContext,
    ExecutionContextSpec, ExecutionContextStatus, ExecutionPhase, ListResourcesRequest, Session,
    SessionSpec, UpdateAgentExecutionStatusRequest,
};
use stigmer_api::{ExecutionResource, Resource};
use stigmer_core::meta::advance_metadata;
use stigmer_core::phase::{can_transition, is_terminal};
use stigmer_crypto::SecretBox;
use stigmer_pipeline::steps::{
    BuildNewState, LoadExisting, Persist, StartWorkflow, ValidateRequest,
};
use stigmer_pipeline::{ExecutionStarter, FnStep, Pipeline, PipelineError, RequestContext, Step};
use tonic::transport::Channel;
use tonic::{Request, Response, Status};
use tracing::debug;

use crate::base::{Base, ControllerDeps};
use crate::boundary::respond;
use crate::downstream::Downstream;
use crate::envmerge;
use crate::refs::{reference_for, resolve_failure};

const BAG_INSTANCE: &str = "instance";
const BAG_TEMPLATE: &str = "agent_template";
const BAG_ENVIRONMENTS: &str = "environments";
const BAG_MERGED_ENV: &str = "merged_env";

/// Hours an ExecutionContext survives as a backstop when the execution
/// never reaches a terminal phase.
const EXECUTION_CONTEXT_TTL_HOURS: i64 = 24;

/// Resolves `spec.agent_instance_ref` and normalizes it to the instance
/// id.
struct ResolveInstance {
    instances: AgentInstanceQueryControllerClient<Channel>,
}

#[async_trait]
impl Step<AgentExecution, AgentExecution> for ResolveInstance {
    fn name(&self) -> &'static str {
        "resolve_instance"
    }

    async fn execute(
        &self,
        ctx: &mut RequestContext<AgentExecution, AgentExecution>,
    ) -> Result<(), PipelineError> {
        let state = ctx
            .new_state
            .as_mut()
            .ok_or_else(|| PipelineError::internal("new state missing"))?;
        let org = state.org().to_string();
        let instance_ref = state
            .spec
            .as_ref()
            .map_or(String::new(), |s| s.agent_instance_ref.clone());

        let instance = self
            .instances
            .clone()
            .get_by_reference(reference_for(
                ApiResourceKind::AgentInstance,
                &org,
                &instance_ref,
            ))
            .await
            .map_err(|s| resolve_failure(s, ApiResourceKind::AgentInstance, &instance_ref))?
            .into_inner();

        if let Some(spec) = state.spec.as_mut() {
            spec.agent_instance_ref = instance.id().to_string();
        }
        ctx.put(BAG_INSTANCE, instance);
        Ok(())
    }
}

/// Loads the agent template behind the resolved instance, for its
/// declared environment defaults.
struct ResolveTemplate {
    agents: AgentQueryControllerClient<Channel>,
}

#[async_trait]
impl Step<AgentExecution, AgentExecution> for ResolveTemplate {
    fn name(&self) -> &'static str {
        "resolve_template"
    }

    async fn execute(
        &self,
        ctx: &mut RequestContext<AgentExecution, AgentExecution>,
    ) -> Result<(), PipelineError> {
        let instance = ctx
            .get::<AgentInstance>(BAG_INSTANCE)
            .ok_or_else(|| PipelineError::internal("instance not resolved"))?;
        let org = instance.org().to_string();
        let agent_ref = instance
            .spec
            .as_ref()
            .map_or(String::new(), |s| s.agent_ref.clone());

        let template = self
            .agents
            .clone()
            .get_by_reference(reference_for(ApiResourceKind::Agent, &org, &agent_ref))
            .await
            .map_err(|s| resolve_failure(s, ApiResourceKind::Agent, &agent_ref))?
            .into_inner();

        ctx.put(BAG_TEMPLATE, template);
        Ok(())
    }
}

/// Resolves every environment reference of the instance, in list order.
struct ResolveEnvironments {
    environments: EnvironmentQueryControllerClient<Channel>,
}

#[async_trait]
impl Step<AgentExecution, AgentExecution> for ResolveEnvironments {
    fn name(&self) -> &'static str {
        "resolve_environments"
    }

    async fn execute(
        &self,
        ctx: &mut RequestContext<AgentExecution, AgentExecution>,
    ) -> Result<(), PipelineError> {
        let instance = ctx
            .get::<AgentInstance>(BAG_INSTANCE)
            .ok_or_else(|| PipelineError::internal("instance not resolved"))?;
        let org = instance.org().to_string();
        let env_refs: Vec<String> = instance
            .spec
            .as_ref()
            .map_or_else(Vec::new, |s| s.environment_refs.clone());

        let mut environments = Vec::with_capacity(env_refs.len());
        for env_ref in &env_refs {
            let environment = self
                .environments
                .clone()
                .get_by_reference(reference_for(ApiResourceKind::Environment, &org, env_ref))
                .await
                .map_err(|s| resolve_failure(s, ApiResourceKind::Environment, env_ref))?
                .into_inner();
            environments.push(environment);
        }
        ctx.put(BAG_ENVIRONMENTS, environments);
        Ok(())
    }
}

/// Merges template defaults, environment refs and the runtime override
/// into the plaintext map, decrypting secrets.
struct MergeEnvironment {
    secrets: Arc<SecretBox>,
}

#[async_trait]
impl Step<AgentExecution, AgentExecution> for MergeEnvironment {
    fn name(&self) -> &'static str {
        "merge_environment"
    }

    async fn execute(
        &self,
        ctx: &mut RequestContext<AgentExecution, AgentExecution>,
    ) -> Result<(), PipelineError> {
        let template_spec = ctx
            .get::<Agent>(BAG_TEMPLATE)
            .and_then(|t| t.spec.as_ref())
            .and_then(|s| s.env_spec.clone());
        let environments = ctx
            .get::<Vec<Environment>>(BAG_ENVIRONMENTS)
            .cloned()
            .unwrap_or_default();
        let runtime = ctx
            .new_state
            .as_ref()
            .and_then(|s| s.spec.as_ref())
            .map_or_else(HashMap::new, |s| s.runtime_env.clone());

        let merged = envmerge::merge(
            template_spec.as_ref(),
            &environments,
            &runtime,
            &self.secrets,
        )?;
        ctx.put(BAG_MERGED_ENV, merged);
        Ok(())
    }
}

/// Auto-creates a session when the caller omitted one.
struct EnsureSession {
    sessions: SessionCommandControllerClient<Channel>,
}

#[async_trait]
impl Step<AgentExecution, AgentExecution> for EnsureSession {
    fn name(&self) -> &'static str {
        "ensure_session"
    }

    async fn execute(
        &self,
        ctx: &mut RequestContext<AgentExecution, AgentExecution>,
    ) -> Result<(), PipelineError> {
        let state = ctx
            .new_state
            .as_mut()
            .ok_or_else(|| PipelineError::internal("new state missing"))?;
        let has_session = state
            .spec
            .as_ref()
            .is_some_and(|s| !s.session_id.is_empty());
        if has_session {
            return Ok(());
        }

        let execution_id = state.id().to_string();
        let session = Session {
            metadata: Some(ApiResourceMetadata {
                name: format!("session-{execution_id}"),
                org: state.org().to_string(),
                ..Default::default()
            }),
            spec: Some(SessionSpec::default()),
            status: None,
        };
        let created = self
            .sessions
            .clone()
            .create(session)
            .await
            .map_err(PipelineError::from)?
            .into_inner();

        debug!(execution = execution_id, session = created.id(), "auto-created session");
        if let Some(spec) = state.spec.as_mut() {
            spec.session_id = created.id().to_string();
        }
        Ok(())
    }
}

/// Persists the merged environment as the execution's ExecutionContext
/// before the execution itself becomes visible.
struct PersistExecutionContext {
    contexts: ExecutionContextCommandControllerClient<Channel>,
    clock: Arc<dyn stigmer_core::Clock>,
}

#[async_trait]
impl Step<AgentExecution, AgentExecution> for PersistExecutionContext {
    fn name(&self) -> &'static str {
        "persist_execution_context"
    }

    async fn execute(
        &self,
        ctx: &mut RequestContext<AgentExecution, AgentExecution>,
    ) -> Result<(), PipelineError> {
        let state = ctx
            .new_state
            .as_ref()
            .ok_or_else(|| PipelineError::internal("new state missing"))?;
        let merged = ctx
            .get::<HashMap<String, EnvVarValue>>(BAG_MERGED_ENV)
            .cloned()
            .ok_or_else(|| PipelineError::internal("environment not merged"))?;

        let expires_at = (self.clock.now()
            + chrono::Duration::hours(EXECUTION_CONTEXT_TTL_HOURS))
        .to_rfc3339_opts(chrono::SecondsFormat::Micros, true);

        let context = ExecutionContext {
            metadata: Some(ApiResourceMetadata {
                id: state.id().to_string(),
                name: state.id().to_string(),
                org: state.org().to_string(),
                ..Default::default()
            }),
            spec: Some(ExecutionContextSpec {
                execution_id: state.id().to_string(),
                env: merged,
            }),
            status: Some(ExecutionContextStatus { expires_at }),
        };

        self.contexts
            .clone()
            .create(context)
            .await
            .map_err(PipelineError::from)?;
        Ok(())
    }
}

/// Deletes the ExecutionContext once the execution is terminal.
struct DropContextOnTerminal {
    contexts: ExecutionContextCommandControllerClient<Channel>,
}

#[async_trait]
impl Step<UpdateAgentExecutionStatusRequest, AgentExecution> for DropContextOnTerminal {
    fn name(&self) -> &'static str {
        "drop_context_on_terminal"
    }

    async fn execute(
        &self,
        ctx: &mut RequestContext<UpdateAgentExecutionStatusRequest, AgentExecution>,
    ) -> Result<(), PipelineError> {
        let Some(state) = ctx.new_state.as_ref() else {
            return Ok(());
        };
        if !is_terminal(state.phase()) {
            return Ok(());
        }
        let execution_id = state.id().to_string();
        match self
            .contexts
            .clone()
            .delete(ApiResourceId {
                value: execution_id.clone(),
            })
            .await
        {
            Ok(_) => {}
            // Already swept or never created; deletes stay idempotent.
            Err(status) if status.code() == tonic::Code::NotFound => {}
            Err(status) => return Err(status.into()),
        }
        debug!(execution = execution_id, "execution context dropped");
        Ok(())
    }
}

/// Serves AgentExecutionCommandController and AgentExecutionQueryController.
pub struct AgentExecutionController {
    base: Base<AgentExecution>,
    instances: Downstream<AgentInstanceQueryControllerClient<Channel>>,
    agents: Downstream<AgentQueryControllerClient<Channel>>,
    environments: Downstream<EnvironmentQueryControllerClient<Channel>>,
    sessions: Downstream<SessionCommandControllerClient<Channel>>,
    contexts: Downstream<ExecutionContextCommandControllerClient<Channel>>,
    starter: OnceLock<Arc<dyn ExecutionStarter>>,
    secrets: Arc<SecretBox>,
}

impl std::fmt::Debug for AgentExecutionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentExecutionController").finish_non_exhaustive()
    }
}

impl AgentExecutionController {
    /// Create the controller; clients and the workflow creator are
    /// injected during wiring.
    #[must_use]
    pub fn new(deps: ControllerDeps, secrets: Arc<SecretBox>) -> Self {
        Self {
            base: Base::new(deps),
            instances: Downstream::new("agent-instance-query"),
            agents: Downstream::new("agent-query"),
            environments: Downstream::new("environment-query"),
            sessions: Downstream::new("session-command"),
            contexts: Downstream::new("execution-context-command"),
            starter: OnceLock::new(),
            secrets,
        }
    }

    /// Inject the AgentInstance query client.
    pub fn set_instance_client(&self, client: AgentInstanceQueryControllerClient<Channel>) {
        self.instances.set(client);
    }

    /// Inject the Agent query client.
    pub fn set_agent_client(&self, client: AgentQueryControllerClient<Channel>) {
        self.agents.set(client);
    }

    /// Inject the Environment query client.
    pub fn set_environment_client(&self, client: EnvironmentQueryControllerClient<Channel>) {
        self.environments.set(client);
    }

    /// Inject the Session command client.
    pub fn set_session_client(&self, client: SessionCommandControllerClient<Channel>) {
        self.sessions.set(client);
    }

    /// Inject the ExecutionContext command client.
    pub fn set_context_client(&self, client: ExecutionContextCommandControllerClient<Channel>) {
        self.contexts.set(client);
    }

    /// Inject the Temporal workflow creator. Never called when Temporal
    /// is degraded; the start step then skips with a warning.
    pub fn set_workflow_creator(&self, starter: Arc<dyn ExecutionStarter>) {
        let _ = self.starter.set(starter);
    }

    async fn do_create(&self, request: AgentExecution) -> Result<AgentExecution, PipelineError> {
        let pipeline: Pipeline<AgentExecution, AgentExecution> = Pipeline::new()
            .add_step(ValidateRequest::new())
            .add_step(BuildNewState::new(
                Arc::clone(&self.base.deps.ids),
                Arc::clone(&self.base.deps.clock),
            ))
            .add_step(FnStep::new(
                "default_name",
                |ctx: &mut RequestContext<AgentExecution, AgentExecution>| {
                    if let Some(state) = ctx.new_state.as_mut() {
                        let id = state.id().to_string();
                        let meta = state.meta_mut();
                        if meta.name.is_empty() {
                            meta.name = id;
                        }
                    }
                    Ok(())
                },
            ))
            .add_step(ResolveInstance {
                instances: self.instances.get()?,
            })
            .add_step(ResolveTemplate {
                agents: self.agents.get()?,
            })
            .add_step(ResolveEnvironments {
                environments: self.environments.get()?,
            })
            .add_step(MergeEnvironment {
                secrets: Arc::clone(&self.secrets),
            })
            .add_step(EnsureSession {
                sessions: self.sessions.get()?,
            })
            .add_step(PersistExecutionContext {
                contexts: self.contexts.get()?,
                clock: Arc::clone(&self.base.deps.clock),
            })
            .add_step(FnStep::new(
                "mark_pending",
                |ctx: &mut RequestContext<AgentExecution, AgentExecution>| {
                    if let Some(state) = ctx.new_state.as_mut() {
                        state.set_phase(ExecutionPhase::Pending);
                    }
                    Ok(())
                },
            ))
            .add_step(Persist::new(self.base.store.clone()))
            .add_step(StartWorkflow::new(
                self.starter.get().cloned(),
                self.base.store.clone(),
            ));

        let mut ctx = RequestContext::new(request);
        pipeline.execute(&mut ctx).await?;
        ctx.new_state
            .ok_or_else(|| PipelineError::internal("pipeline produced no state"))
    }

    async fn do_update_status(
        &self,
        request: UpdateAgentExecutionStatusRequest,
    ) -> Result<AgentExecution, PipelineError> {
        let clock = Arc::clone(&self.base.deps.clock);
        let pipeline: Pipeline<UpdateAgentExecutionStatusRequest, AgentExecution> =
            Pipeline::new()
                .add_step(ValidateRequest::new())
                .add_step(FnStep::new(
                    "extract_execution_id",
                    |ctx: &mut RequestContext<UpdateAgentExecutionStatusRequest, AgentExecution>| {
                        ctx.resource_id = Some(ctx.request().execution_id.clone());
                        Ok(())
                    },
                ))
                .add_step(LoadExisting::new(self.base.store.clone()))
                .add_step(FnStep::new(
                    "apply_status",
                    move |ctx: &mut RequestContext<
                        UpdateAgentExecutionStatusRequest,
                        AgentExecution,
                    >| {
                        let existing = ctx
                            .existing
                            .clone()
                            .ok_or_else(|| PipelineError::internal("existing not loaded"))?;
                        let incoming = ctx
                            .request()
                            .status
                            .clone()
                            .ok_or_else(|| PipelineError::invalid_argument("status must be set"))?;

                        let from = existing.phase();
                        let to = incoming.phase();
                        if !can_transition(from, to) {
                            return Err(PipelineError::failed_precondition(format!(
                                "illegal phase transition {from:?} -> {to:?} for {}",
                                existing.id()
                            )));
                        }

                        let mut updated = existing.clone();
                        {
                            let status = updated.status.get_or_insert_with(Default::default);
                            status.phase = incoming.phase;
                            if !incoming.error.is_empty() {
                                status.error = incoming.error.clone();
                            }
                            if !incoming.temporal_workflow_id.is_empty() {
                                status.temporal_workflow_id =
                                    incoming.temporal_workflow_id.clone();
                            }
                            if !incoming.tool_calls.is_empty() {
                                status.tool_calls = incoming.tool_calls.clone();
                            }
                        }
                        advance_metadata(&existing, &mut updated, clock.as_ref());
                        ctx.new_state = Some(updated);
                        Ok(())
                    },
                ))
                .add_step(Persist::new(self.base.store.clone()))
                .add_step(DropContextOnTerminal {
                    contexts: self.contexts.get()?,
                });

        let mut ctx = RequestContext::new(request);
        pipeline.execute(&mut ctx).await?;
        ctx.new_state
            .ok_or_else(|| PipelineError::internal("pipeline produced no state"))
    }
}

#[tonic::async_trait]
impl AgentExecutionCommandApi for AgentExecutionController {
    async fn apply(
        &self,
        request: Request<AgentExecution>,
    ) -> Result<Response<AgentExecution>, Status> {
        // Executions are one-shot; Apply is Create.
        respond(
            self.do_create(request.into_inner()).await,
            ApiResourceKind::AgentExecution,
            "apply",
        )
    }

    async fn create(
        &self,
        request: Request<AgentExecution>,
    ) -> Result<Response<AgentExecution>, Status> {
        respond(
            self.do_create(request.into_inner()).await,
            ApiResourceKind::AgentExecution,
            "create",
        )
    }

    async fn update(
        &self,
        request: Request<AgentExecution>,
    ) -> Result<Response<AgentExecution>, Status> {
        respond(
            self.base.update(request.into_inner()).await,
            ApiResourceKind::AgentExecution,
            "update",
        )
    }

    async fn delete(
        &self,
        request: Request<ApiResourceId>,
    ) -> Result<Response<AgentExecution>, Status> {
        // The standard delete pipeline with no customizations.
        respond(
            self.base.delete(request.into_inner()).await,
            ApiResourceKind::AgentExecution,
            "delete",
        )
    }

    async fn update_status(
        &self,
        request: Request<UpdateAgentExecutionStatusRequest>,
    ) -> Result<Response<AgentExecution>, Status> {
        respond(
            self.do_update_status(request.into_inner()).await,
            ApiResourceKind::AgentExecution,
            "update_status",
        )
    }
}

#[tonic::async_trait]
impl AgentExecutionQueryApi for AgentExecutionController {
    async fn get(
        &self,
        request: Request<ApiResourceId>,
    ) -> Result<Response<AgentExecution>, Status> {
        respond(
            self.base.get(request.into_inner()).await,
            ApiResourceKind::AgentExecution,
            "get",
        )
    }

    async fn get_by_reference(
        &self,
        request: Request<ApiResourceReference>,
    ) -> Result<Response<AgentExecution>, Status> {
        respond(
            self.base.get_by_reference(request.into_inner()).await,
            ApiResourceKind::AgentExecution,
            "get_by_reference",
        )
    }

    async fn list(
        &self,
        request: Request<ListResourcesRequest>,
    ) -> Result<Response<AgentExecutionList>, Status> {
        let result = self
            .base
            .list(&request.into_inner().org)
            .await
            .map(|items| AgentExecutionList { items });
        respond(result, ApiResourceKind::AgentExecution, "list")
    }
}
