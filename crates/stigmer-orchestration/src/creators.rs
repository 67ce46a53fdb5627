//! Per-domain workflow creators: thin wrappers over [`WorkflowService`]
//! carrying each domain's queue, workflow name, id policy, and timeouts.
//! They implement the pipeline-facing ports so controllers stay ignorant
//! of the orchestration wiring.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use prost::Message;
use stigmer_api::v1::Workflow;
use stigmer_pipeline::{ExecutionStarter, PipelineError, WorkflowSpecValidator};

use crate::config::TemporalConfig;
use crate::error::OrchestrationError;
use crate::port::{StartWorkflowOptions, WorkflowService};
use crate::wire::ValidationResult;
use crate::workflows::ExecutionDomain;
use crate::{names, queues};

fn map_start_error(err: OrchestrationError) -> PipelineError {
    match &err {
        OrchestrationError::WorkflowAlreadyStarted(id) => PipelineError::failed_precondition(
            format!("workflow {id} is already running"),
        ),
        OrchestrationError::UnknownWorkflow { .. } | OrchestrationError::Shutdown => {
            PipelineError::unavailable(err.to_string())
        }
        OrchestrationError::Timeout { .. } => {
            PipelineError::new(stigmer_core::ErrorKind::DeadlineExceeded, err.to_string())
        }
        _ => PipelineError::internal(err.to_string()),
    }
}

/// Starts one execution domain's orchestrator workflow.
pub struct WorkflowCreator {
    service: Arc<dyn WorkflowService>,
    domain: ExecutionDomain,
    config: TemporalConfig,
}

impl WorkflowCreator {
    /// Creator for the agent-execution domain.
    #[must_use]
    pub fn agent_execution(service: Arc<dyn WorkflowService>, config: TemporalConfig) -> Self {
        Self {
            service,
            domain: crate::workflows::AGENT_EXECUTION,
            config,
        }
    }

    /// Creator for the workflow-execution domain.
    #[must_use]
    pub fn workflow_execution(service: Arc<dyn WorkflowService>, config: TemporalConfig) -> Self {
        Self {
            service,
            domain: crate::workflows::WORKFLOW_EXECUTION,
            config,
        }
    }
}

#[async_trait]
impl ExecutionStarter for WorkflowCreator {
    async fn start(
        &self,
        execution_id: &str,
        has_callback: bool,
    ) -> Result<String, PipelineError> {
        let execution_timeout = if has_callback {
            self.config.async_execution_timeout
        } else {
            self.config.execution_timeout
        };
        // The workflow id is the execution id: deterministic, and the
        // Reject reuse policy makes double-starts visible.
        let options = StartWorkflowOptions {
            workflow_id: execution_id.to_string(),
            workflow_name: self.domain.workflow_name.to_string(),
            task_queue: self.domain.orchestrator_queue.to_string(),
            execution_timeout,
        };
        // The input is the execution id alone; environment material is
        // fetched by activities at entry and never enters history.
        let run = self
            .service
            .start_workflow(options, execution_id.to_string())
            .await
            .map_err(map_start_error)?;
        Ok(run.workflow_id)
    }
}

/// Runs the validation workflow synchronously against a workflow spec.
pub struct WorkflowValidation {
    service: Arc<dyn WorkflowService>,
    config: TemporalConfig,
}

impl WorkflowValidation {
    /// Create the validator.
    #[must_use]
    pub fn new(service: Arc<dyn WorkflowService>, config: TemporalConfig) -> Self {
        Self { service, config }
    }
}

#[async_trait]
impl WorkflowSpecValidator for WorkflowValidation {
    async fn validate(&self, workflow: &Workflow) -> Result<(), PipelineError> {
        let payload = BASE64.encode(workflow.encode_to_vec());
        let options = StartWorkflowOptions {
            workflow_id: format!("validate-{}", uuid::Uuid::new_v4()),
            workflow_name: names::VALIDATE_WORKFLOW.to_string(),
            task_queue: queues::WORKFLOW_VALIDATION_STIGMER.to_string(),
            execution_timeout: self.config.validation_timeout,
        };

        let verdict_json = self
            .service
            .execute_workflow(options, payload)
            .await
            .map_err(|err| match &err {
                OrchestrationError::Timeout { .. } => PipelineError::new(
                    stigmer_core::ErrorKind::DeadlineExceeded,
                    format!("workflow validation timed out: {err}"),
                ),
                OrchestrationError::UnknownWorkflow { .. } => {
                    PipelineError::unavailable(err.to_string())
                }
                _ => PipelineError::internal(err.to_string()),
            })?;

        let verdict: ValidationResult = serde_json::from_str(&verdict_json).map_err(|e| {
            PipelineError::internal(format!("validation result decoding: {e}"))
        })?;
        if !verdict.valid {
            return Err(PipelineError::invalid_argument(format!(
                "workflow spec rejected: {}",
                verdict.message
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalEngine;
    use crate::port::{ActivityOutcome, WorkerRegistry};
    use crate::workflows;

    fn validation_engine(valid: bool) -> LocalEngine {
        let registry = WorkerRegistry::new();
        workflows::register_validation_workflow(&registry);
        registry.register_activity(
            queues::WORKFLOW_VALIDATION_RUNNER,
            names::VALIDATE_WORKFLOW_DEFINITION,
            Arc::new(move |_, _| {
                Box::pin(async move {
                    let verdict = ValidationResult {
                        valid,
                        message: if valid {
                            String::new()
                        } else {
                            "task \"a\" duplicated".to_string()
                        },
                    };
                    Ok(ActivityOutcome::Completed(
                        serde_json::to_string(&verdict).unwrap(),
                    ))
                })
            }),
        );
        LocalEngine::new(registry)
    }

    #[tokio::test]
    async fn valid_spec_passes() {
        let engine = validation_engine(true);
        let validator =
            WorkflowValidation::new(Arc::new(engine), TemporalConfig::default());
        validator.validate(&Workflow::default()).await.unwrap();
    }

    #[tokio::test]
    async fn invalid_spec_maps_to_invalid_argument() {
        let engine = validation_engine(false);
        let validator =
            WorkflowValidation::new(Arc::new(engine), TemporalConfig::default());
        let err = validator.validate(&Workflow::default()).await.unwrap_err();
        assert_eq!(err.kind, stigmer_core::ErrorKind::InvalidArgument);
        assert!(err.message.contains("duplicated"));
    }

    #[tokio::test]
    async fn double_start_is_failed_precondition() {
        let registry = WorkerRegistry::new();
        workflows::register_execution_workflow(&registry, workflows::AGENT_EXECUTION);
        let engine = LocalEngine::new(registry);
        let creator = WorkflowCreator::agent_execution(
            Arc::new(engine),
            TemporalConfig::default(),
        );

        creator.start("aex-1", false).await.unwrap();
        let err = creator.start("aex-1", false).await.unwrap_err();
        assert_eq!(err.kind, stigmer_core::ErrorKind::FailedPrecondition);
    }
}
