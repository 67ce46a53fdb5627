//! WorkflowExecution controller, the workflow-side analogue of
//! AgentExecution. Additionally validates the underlying Workflow spec
//! through the engine before persisting the execution.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use stigmer_api::v1::environment_query_controller_client::EnvironmentQueryControllerClient;
use stigmer_api::v1::execution_context_command_controller_client::ExecutionContextCommandControllerClient;
use stigmer_api::v1::workflow_execution_command_controller_server::WorkflowExecutionCommandController as WorkflowExecutionCommandApi;
use stigmer_api::v1::workflow_execution_query_controller_server::WorkflowExecutionQueryController as WorkflowExecutionQueryApi;
use stigmer_api::v1::workflow_instance_query_controller_client::WorkflowInstanceQueryControllerClient;
use stigmer_api::v1::workflow_query_controller_client::WorkflowQueryControllerClient;
use stigmer_api::v1::{
    ApiResourceId, ApiResourceKind, ApiResourceMetadata, ApiResourceReference, EnvVarValue,
    Environment, ExecutionContext, ExecutionContextSpec, ExecutionContextStatus, ExecutionPhase,
    ListResourcesRequest, UpdateWorkflowExecutionStatusRequest, Workflow, WorkflowExecution,
    WorkflowExecutionList, WorkflowInstance,
};
use stigmer_api::{ExecutionResource, Resource};
use stigmer_core::meta::advance_metadata;
use stigmer_core::phase::{can_transition, is_terminal};
use stigmer_crypto::SecretBox;
use stigmer_pipeline::steps::{BuildNewState, LoadExisting, Persist, StartWorkflow, ValidateRequest};
use stigmer_pipeline::{
    ExecutionStarter, FnStep, Pipeline, PipelineError, RequestContext, Step, WorkflowSpecValidator,
};
use tonic::transport::Channel;
use tonic::{Request, Response, Status};
use tracing::{debug, warn};

use crate::base::{Base, ControllerDeps};
use crate::boundary::respond;
use crate::downstream::Downstream;
use crate::envmerge;
use crate::refs::{reference_for, resolve_failure};

const BAG_INSTANCE: &str = "instance";
const BAG_TEMPLATE: &str = "workflow_template";
const BAG_ENVIRONMENTS: &str = "environments";
const BAG_MERGED_ENV: &str = "merged_env";

const EXECUTION_CONTEXT_TTL_HOURS: i64 = 24;

struct ResolveInstance {
    instances: WorkflowInstanceQueryControllerClient<Channel>,
}

#[async_trait]
impl Step<WorkflowExecution, WorkflowExecution> for ResolveInstance {
    fn name(&self) -> &'static str {
        "resolve_instance"
    }

    async fn execute(
        &self,
        ctx: &mut RequestContext<WorkflowExecution, WorkflowExecution>,
    ) -> Result<(), PipelineError> {
        let state = ctx
            .new_state
            .as_mut()
            .ok_or_else(|| PipelineError::internal("new state missing"))?;
        let org = state.org().to_string();
        let instance_ref = state
            .spec
            .as_ref()
            .map_or(String::new(), |s| s.workflow_instance_ref.clone());

        let instance = self
            .instances
            .clone()
            .get_by_reference(reference_for(
                ApiResourceKind::WorkflowInstance,
                &org,
                &instance_ref,
            ))
            .await
            .map_err(|s| resolve_failure(s, ApiResourceKind::WorkflowInstance, &instance_ref))?
            .into_inner();

        if let Some(spec) = state.spec.as_mut() {
            spec.workflow_instance_ref = instance.id().to_string();
        }
        ctx.put(BAG_INSTANCE, instance);
        Ok(())
    }
}

/// Loads and engine-validates the workflow template behind the instance.
struct ResolveAndValidateTemplate {
    workflows: WorkflowQueryControllerClient<Channel>,
    validator: Option<Arc<dyn WorkflowSpecValidator>>,
}

#[async_trait]
impl Step<WorkflowExecution, WorkflowExecution> for ResolveAndValidateTemplate {
    fn name(&self) -> &'static str {
        "resolve_and_validate_template"
    }

    async fn execute(
        &self,
        ctx: &mut RequestContext<WorkflowExecution, WorkflowExecution>,
    ) -> Result<(), PipelineError> {
        let instance = ctx
            .get::<WorkflowInstance>(BAG_INSTANCE)
            .ok_or_else(|| PipelineError::internal("instance not resolved"))?;
        let org = instance.org().to_string();
        let workflow_ref = instance
            .spec
            .as_ref()
            .map_or(String::new(), |s| s.workflow_ref.clone());

        let template = self
            .workflows
            .clone()
            .get_by_reference(reference_for(ApiResourceKind::Workflow, &org, &workflow_ref))
            .await
            .map_err(|s| resolve_failure(s, ApiResourceKind::Workflow, &workflow_ref))?
            .into_inner();

        match &self.validator {
            Some(validator) => validator.validate(&template).await?,
            None => warn!("Temporal not connected; skipping workflow spec validation"),
        }

        ctx.put(BAG_TEMPLATE, template);
        Ok(())
    }
}

struct ResolveEnvironments {
    environments: EnvironmentQueryControllerClient<Channel>,
}

#[async_trait]
impl Step<WorkflowExecution, WorkflowExecution> for ResolveEnvironments {
    fn name(&self) -> &'static str {
        "resolve_environments"
    }

    async fn execute(
        &self,
        ctx: &mut RequestContext<WorkflowExecution, WorkflowExecution>,
    ) -> Result<(), PipelineError> {
        let instance = ctx
            .get::<WorkflowInstance>(BAG_INSTANCE)
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

struct MergeEnvironment {
    secrets: Arc<SecretBox>,
}

#[async_trait]
impl Step<WorkflowExecution, WorkflowExecution> for MergeEnvironment {
    fn name(&self) -> &'static str {
        "merge_environment"
    }

    async fn execute(
        &self,
        ctx: &mut RequestContext<WorkflowExecution, WorkflowExecution>,
    ) -> Result<(), PipelineError> {
        let template_spec = ctx
            .get::<Workflow>(BAG_TEMPLATE)
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

struct PersistExecutionContext {
    contexts: ExecutionContextCommandControllerClient<Channel>,
    clock: Arc<dyn stigmer_core::Clock>,
}

#[async_trait]
impl Step<WorkflowExecution, WorkflowExecution> for PersistExecutionContext {
    fn name(&self) -> &'static str {
        "persist_execution_context"
    }

    async fn execute(
        &self,
        ctx: &mut RequestContext<WorkflowExecution, WorkflowExecution>,
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

struct DropContextOnTerminal {
    contexts: ExecutionContextCommandControllerClient<Channel>,
}

#[async_trait]
impl Step<UpdateWorkflowExecutionStatusRequest, WorkflowExecution> for DropContextOnTerminal {
    fn name(&self) -> &'static str {
        "drop_context_on_terminal"
    }

    async fn execute(
        &self,
        ctx: &mut RequestContext<UpdateWorkflowExecutionStatusRequest, WorkflowExecution>,
    ) -> Result<(), PipelineError> {
        let Some(state) = ctx.new_state.as_ref() else {
            return Ok(());
        };
        if !is_terminal(state.phase()) {
            return Ok(());
        }
        match self
            .contexts
            .clone()
            .delete(ApiResourceId {
                value: state.id().to_string(),
            })
            .await
        {
            Ok(_) => {}
            Err(status) if status.code() == tonic::Code::NotFound => {}
            Err(status) => return Err(status.into()),
        }
        debug!(execution = state.id(), "execution context dropped");
        Ok(())
    }
}

/// Serves WorkflowExecutionCommandController and
/// WorkflowExecutionQueryController.
pub struct WorkflowExecutionController {
    base: Base<WorkflowExecution>,
    instances: Downstream<WorkflowInstanceQueryControllerClient<Channel>>,
    workflows: Downstream<WorkflowQueryControllerClient<Channel>>,
    environments: Downstream<EnvironmentQueryControllerClient<Channel>>,
    contexts: Downstream<ExecutionContextCommandControllerClient<Channel>>,
    starter: OnceLock<Arc<dyn ExecutionStarter>>,
    validator: OnceLock<Arc<dyn WorkflowSpecValidator>>,
    secrets: Arc<SecretBox>,
}

impl std::fmt::Debug for WorkflowExecutionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowExecutionController").finish_non_exhaustive()
    }
}

impl WorkflowExecutionController {
    /// Create the controller; clients, creator and validator are
    /// injected during wiring.
    #[must_use]
    pub fn new(deps: ControllerDeps, secrets: Arc<SecretBox>) -> Self {
        Self {
            base: Base::new(deps),
            instances: Downstream::new("workflow-instance-query"),
            workflows: Downstream::new("workflow-query"),
            environments: Downstream::new("environment-query"),
            contexts: Downstream::new("execution-context-command"),
            starter: OnceLock::new(),
            validator: OnceLock::new(),
            secrets,
        }
    }

    /// Inject the WorkflowInstance query client.
    pub fn set_instance_client(&self, client: WorkflowInstanceQueryControllerClient<Channel>) {
        self.instances.set(client);
    }

    /// Inject the Workflow query client.
    pub fn set_workflow_client(&self, client: WorkflowQueryControllerClient<Channel>) {
        self.workflows.set(client);
    }

    /// Inject the Environment query client.
    pub fn set_environment_client(&self, client: EnvironmentQueryControllerClient<Channel>) {
        self.environments.set(client);
    }

    /// Inject the ExecutionContext command client.
    pub fn set_context_client(&self, client: ExecutionContextCommandControllerClient<Channel>) {
        self.contexts.set(client);
    }

    /// Inject the Temporal workflow creator.
    pub fn set_workflow_creator(&self, starter: Arc<dyn ExecutionStarter>) {
        let _ = self.starter.set(starter);
    }

    /// Inject the engine-backed spec validator.
    pub fn set_spec_validator(&self, validator: Arc<dyn WorkflowSpecValidator>) {
        let _ = self.validator.set(validator);
    }

    async fn do_create(
        &self,
        request: WorkflowExecution,
    ) -> Result<WorkflowExecution, PipelineError> {
        let pipeline: Pipeline<WorkflowExecution, WorkflowExecution> = Pipeline::new()
            .add_step(ValidateRequest::new())
            .add_step(BuildNewState::new(
                Arc::clone(&self.base.deps.ids),
                Arc::clone(&self.base.deps.clock),
            ))
            .add_step(FnStep::new(
                "default_name",
                |ctx: &mut RequestContext<WorkflowExecution, WorkflowExecution>| {
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
            .add_step(ResolveAndValidateTemplate {
                workflows: self.workflows.get()?,
                validator: self.validator.get().cloned(),
            })
            .add_step(ResolveEnvironments {
                environments: self.environments.get()?,
            })
            .add_step(MergeEnvironment {
                secrets: Arc::clone(&self.secrets),
            })
            .add_step(PersistExecutionContext {
                contexts: self.contexts.get()?,
                clock: Arc::clone(&self.base.deps.clock),
            })
            .add_step(FnStep::new(
                "mark_pending",
                |ctx: &mut RequestContext<WorkflowExecution, WorkflowExecution>| {
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
        request: UpdateWorkflowExecutionStatusRequest,
    ) -> Result<WorkflowExecution, PipelineError> {
        let clock = Arc::clone(&self.base.deps.clock);
        let pipeline: Pipeline<UpdateWorkflowExecutionStatusRequest, WorkflowExecution> =
            Pipeline::new()
                .add_step(ValidateRequest::new())
                .add_step(FnStep::new(
                    "extract_execution_id",
                    |ctx: &mut RequestContext<
                        UpdateWorkflowExecutionStatusRequest,
                        WorkflowExecution,
                    >| {
                        ctx.resource_id = Some(ctx.request().execution_id.clone());
                        Ok(())
                    },
                ))
                .add_step(LoadExisting::new(self.base.store.clone()))
                .add_step(FnStep::new(
                    "apply_status",
                    move |ctx: &mut RequestContext<
                        UpdateWorkflowExecutionStatusRequest,
                        WorkflowExecution,
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
                            if !incoming.output_json.is_empty() {
                                status.output_json = incoming.output_json.clone();
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
impl WorkflowExecutionCommandApi for WorkflowExecutionController {
    async fn apply(
        &self,
        request: Request<WorkflowExecution>,
    ) -> Result<Response<WorkflowExecution>, Status> {
        // Executions are one-shot; Apply is Create.
        respond(
            self.do_create(request.into_inner()).await,
            ApiResourceKind::WorkflowExecution,
            "apply",
        )
    }

    async fn create(
        &self,
        request: Request<WorkflowExecution>,
    ) -> Result<Response<WorkflowExecution>, Status> {
        respond(
            self.do_create(request.into_inner()).await,
            ApiResourceKind::WorkflowExecution,
            "create",
        )
    }

    async fn update(
        &self,
        request: Request<WorkflowExecution>,
    ) -> Result<Response<WorkflowExecution>, Status> {
        respond(
            self.base.update(request.into_inner()).await,
            ApiResourceKind::WorkflowExecution,
            "update",
        )
    }

    async fn delete(
        &self,
        request: Request<ApiResourceId>,
    ) -> Result<Response<WorkflowExecution>, Status> {
        respond(
            self.base.delete(request.into_inner()).await,
            ApiResourceKind::WorkflowExecution,
            "delete",
        )
    }

    async fn update_status(
        &self,
        request: Request<UpdateWorkflowExecutionStatusRequest>,
    ) -> Result<Response<WorkflowExecution>, Status> {
        respond(
            self.do_update_status(request.into_inner()).await,
            ApiResourceKind::WorkflowExecution,
            "update_status",
        )
    }
}

#[tonic::async_trait]
impl WorkflowExecutionQueryApi for WorkflowExecutionController {
    async fn get(
        &self,
        request: Request<ApiResourceId>,
    ) -> Result<Response<WorkflowExecution>, Status> {
        respond(
            self.base.get(request.into_inner()).await,
            ApiResourceKind::WorkflowExecution,
            "get",
        )
    }

    async fn get_by_reference(
        &self,
        request: Request<ApiResourceReference>,
    ) -> Result<Response<WorkflowExecution>, Status> {
        respond(
            self.base.get_by_reference(request.into_inner()).await,
            ApiResourceKind::WorkflowExecution,
            "get_by_reference",
        )
    }

    async fn list(
        &self,
        request: Request<ListResourcesRequest>,
    ) -> Result<Response<WorkflowExecutionList>, Status> {
        let result = self
            .base
            .list(&request.into_inner().org)
            .await
            .map(|items| WorkflowExecutionList { items });
        respond(result, ApiResourceKind::WorkflowExecution, "list")
    }
}
