//! Temporal-facing steps: workflow start and spec validation.
//!
//! Both are nil-safe: when Temporal was not connected at startup the
//! injected port is `None`, the step logs a warning and skips, and the
//! execution stays `PENDING` (graceful degradation).

use std::sync::Arc;

use async_trait::async_trait;
use stigmer_api::ExecutionResource;
use stigmer_api::v1::{ExecutionPhase, Workflow};
use stigmer_store::TypedStore;
use tracing::{error, warn};

use crate::ports::{ExecutionStarter, WorkflowSpecValidator};
use crate::{PipelineError, RequestContext, Step};

/// Starts the domain's Temporal workflow for the persisted execution.
///
/// On failure the execution is overwritten to `FAILED` and persisted
/// before the error is returned, so the caller sees both a failed RPC and
/// a durable FAILED execution rather than a silent PENDING one.
pub struct StartWorkflow<R> {
    starter: Option<Arc<dyn ExecutionStarter>>,
    store: TypedStore<R>,
}

impl<R: ExecutionResource> StartWorkflow<R> {
    /// Create the step. `starter` is `None` when Temporal is degraded.
    #[must_use]
    pub fn new(starter: Option<Arc<dyn ExecutionStarter>>, store: TypedStore<R>) -> Self {
        Self { starter, store }
    }
}

#[async_trait]
impl<Req: Send + Sync, R: ExecutionResource> Step<Req, R> for StartWorkflow<R> {
    fn name(&self) -> &'static str {
        "start_workflow"
    }

    async fn execute(&self, ctx: &mut RequestContext<Req, R>) -> Result<(), PipelineError> {
        let state = ctx
            .new_state
            .as_mut()
            .ok_or_else(|| PipelineError::internal("new state missing"))?;

        let Some(starter) = &self.starter else {
            warn!(
                execution = state.id(),
                kind = %R::KIND,
                "Temporal not connected; execution stays PENDING"
            );
            return Ok(());
        };

        let has_callback = !state.callback_token().is_empty();

        // Record the (deterministic) workflow id before the start call:
        // once the workflow runs, its status-writing activities own the
        // stored copy and a late save here would race them.
        let workflow_id = starter.workflow_id_for(state.id());
        state.set_workflow_id(&workflow_id);
        self.store.save(state).await?;

        match starter.start(state.id(), has_callback).await {
            Ok(_) => Ok(()),
            Err(err) => {
                state.set_phase(ExecutionPhase::Failed);
                state.set_error(&err.message);
                if let Err(persist_err) = self.store.save(state).await {
                    // The start error is authoritative; record the
                    // secondary failure without masking it.
                    error!(
                        execution = state.id(),
                        error = %persist_err,
                        "failed to persist FAILED phase after workflow start error"
                    );
                }
                Err(err)
            }
        }
    }
}

/// Invokes the Temporal workflow-validation worker synchronously with a
/// short timeout (proto → YAML → engine parse).
pub struct ValidateWorkflowSpec {
    validator: Option<Arc<dyn WorkflowSpecValidator>>,
}

impl ValidateWorkflowSpec {
    /// Create the step. `validator` is `None` when Temporal is degraded.
    #[must_use]
    pub fn new(validator: Option<Arc<dyn WorkflowSpecValidator>>) -> Self {
        Self { validator }
    }
}

#[async_trait]
impl Step<Workflow, Workflow> for ValidateWorkflowSpec {
    fn name(&self) -> &'static str {
        "validate_workflow_spec"
    }

    async fn execute(
        &self,
        ctx: &mut RequestContext<Workflow, Workflow>,
    ) -> Result<(), PipelineError> {
        let Some(validator) = &self.validator else {
            warn!("Temporal not connected; skipping workflow spec validation");
            return Ok(());
        };
        validator.validate(ctx.request()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stigmer_api::Resource;
    use stigmer_api::v1::{AgentExecution, AgentExecutionSpec, ApiResourceMetadata};
    use stigmer_core::ErrorKind;
    use stigmer_store::MemoryKvStore;

    struct FailingStarter;

    #[async_trait]
    impl ExecutionStarter for FailingStarter {
        async fn start(&self, _: &str, _: bool) -> Result<String, PipelineError> {
            Err(PipelineError::unavailable("no worker available"))
        }
    }

    struct OkStarter;

    #[async_trait]
    impl ExecutionStarter for OkStarter {
        fn workflow_id_for(&self, execution_id: &str) -> String {
            format!("wf-{execution_id}")
        }

        async fn start(&self, execution_id: &str, _: bool) -> Result<String, PipelineError> {
            Ok(format!("wf-{execution_id}"))
        }
    }

    fn execution(id: &str) -> AgentExecution {
        AgentExecution {
            metadata: Some(ApiResourceMetadata {
                id: id.to_string(),
                name: id.to_string(),
                org: "acme".to_string(),
                ..Default::default()
            }),
            spec: Some(AgentExecutionSpec::default()),
            status: None,
        }
    }

    #[tokio::test]
    async fn nil_starter_skips() {
        let store: TypedStore<AgentExecution> =
            TypedStore::new(std::sync::Arc::new(MemoryKvStore::new()));
        let step = StartWorkflow::new(None, store);
        let mut ctx: RequestContext<(), AgentExecution> = RequestContext::new(());
        ctx.new_state = Some(execution("aex-1"));
        step.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.new_state.as_ref().unwrap().phase(), ExecutionPhase::Unspecified);
    }

    #[tokio::test]
    async fn start_failure_persists_failed_phase() {
        let store: TypedStore<AgentExecution> =
            TypedStore::new(std::sync::Arc::new(MemoryKvStore::new()));
        let step = StartWorkflow::new(Some(Arc::new(FailingStarter)), store.clone());

        let mut ctx: RequestContext<(), AgentExecution> = RequestContext::new(());
        ctx.new_state = Some(execution("aex-1"));
        let err = step.execute(&mut ctx).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unavailable);

        let stored = store.get("aex-1").await.unwrap().unwrap();
        assert_eq!(stored.phase(), ExecutionPhase::Failed);
        assert!(stored.error().contains("no worker available"));
    }

    #[tokio::test]
    async fn start_success_records_workflow_id() {
        let store: TypedStore<AgentExecution> =
            TypedStore::new(std::sync::Arc::new(MemoryKvStore::new()));
        let step = StartWorkflow::new(Some(Arc::new(OkStarter)), store.clone());

        let mut ctx: RequestContext<(), AgentExecution> = RequestContext::new(());
        ctx.new_state = Some(execution("aex-7"));
        step.execute(&mut ctx).await.unwrap();

        let stored = store.get("aex-7").await.unwrap().unwrap();
        assert_eq!(
            stored.status.as_ref().unwrap().temporal_workflow_id,
            "wf-aex-7"
        );
    }
}
