//! Orchestrator workflows registered on the stigmer-owned queues.
//!
//! Workflow code is deterministic: every store read, status write, and
//! external completion goes through an activity. The agent-execution and
//! workflow-execution domains share one driver parameterized by their
//! queue and activity names.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::error::OrchestrationError;
use crate::port::{ActivityOptions, WorkerRegistry, WorkflowContext};
use crate::wire::{CompletionRequest, ExecutionInfo, StatusUpdate};
use crate::{names, queues};

/// Queue and activity names for one execution domain.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionDomain {
    /// Queue this service's workflows and system activities run on.
    pub orchestrator_queue: &'static str,
    /// Queue the external runner serves.
    pub runner_queue: &'static str,
    /// Registered workflow name.
    pub workflow_name: &'static str,
    /// Fetch-execution activity name.
    pub get_activity: &'static str,
    /// Status-write activity name.
    pub update_status_activity: &'static str,
    /// Runner dispatch activity name.
    pub run_activity: &'static str,
}

/// The agent-execution domain.
pub const AGENT_EXECUTION: ExecutionDomain = ExecutionDomain {
    orchestrator_queue: queues::AGENT_EXECUTION_STIGMER,
    runner_queue: queues::AGENT_EXECUTION_RUNNER,
    workflow_name: names::AGENT_EXECUTION_INVOKE,
    get_activity: names::GET_AGENT_EXECUTION,
    update_status_activity: names::UPDATE_AGENT_EXECUTION_STATUS,
    run_activity: names::RUN_AGENT,
};

/// The workflow-execution domain.
pub const WORKFLOW_EXECUTION: ExecutionDomain = ExecutionDomain {
    orchestrator_queue: queues::WORKFLOW_EXECUTION_STIGMER,
    runner_queue: queues::WORKFLOW_EXECUTION_RUNNER,
    workflow_name: names::WORKFLOW_EXECUTION_INVOKE,
    get_activity: names::GET_WORKFLOW_EXECUTION,
    update_status_activity: names::UPDATE_WORKFLOW_EXECUTION_STATUS,
    run_activity: names::RUN_WORKFLOW,
};

/// Runner dispatch timeout for a standalone execution.
pub const RUN_TIMEOUT: Duration = Duration::from_secs(30 * 60);
/// Runner dispatch timeout when the caller activity waits asynchronously
/// on the callback token.
pub const RUN_TIMEOUT_ASYNC: Duration = Duration::from_secs(24 * 60 * 60);

/// Register an execution domain's orchestrator workflow.
pub fn register_execution_workflow(registry: &WorkerRegistry, domain: ExecutionDomain) {
    registry.register_workflow(
        domain.orchestrator_queue,
        domain.workflow_name,
        Arc::new(move |ctx| Box::pin(execution_workflow(ctx, domain))),
    );
}

/// Register the validation orchestrator workflow.
pub fn register_validation_workflow(registry: &WorkerRegistry) {
    registry.register_workflow(
        queues::WORKFLOW_VALIDATION_STIGMER,
        names::VALIDATE_WORKFLOW,
        Arc::new(|ctx| Box::pin(validation_workflow(ctx))),
    );
}

async fn execution_workflow(
    ctx: Arc<dyn WorkflowContext>,
    domain: ExecutionDomain,
) -> Result<String, OrchestrationError> {
    let execution_id = ctx.input().to_string();

    // 1. Fetch the execution via an activity; workflow code never
    //    touches the store directly.
    let info_json = ctx
        .execute_activity(
            domain.orchestrator_queue,
            domain.get_activity,
            execution_id.clone(),
            ActivityOptions::short(),
        )
        .await?;
    let info: ExecutionInfo = serde_json::from_str(&info_json)
        .map_err(|e| OrchestrationError::Payload(format!("execution info: {e}")))?;

    // 2. Mark RUNNING.
    update_status(&ctx, domain, &execution_id, "RUNNING", None).await?;

    // 3. Dispatch to the runner queue. 24 h budget when the result feeds
    //    a paused external activity.
    let run_timeout = if info.callback_token.is_some() {
        RUN_TIMEOUT_ASYNC
    } else {
        RUN_TIMEOUT
    };
    let outcome = ctx
        .execute_activity(
            domain.runner_queue,
            domain.run_activity,
            execution_id.clone(),
            ActivityOptions::default().with_start_to_close(run_timeout),
        )
        .await;

    // 4. Record the terminal phase and, when a callback token is
    //    present, complete the external activity exactly once.
    match outcome {
        Ok(result) => {
            update_status(&ctx, domain, &execution_id, "COMPLETED", None).await?;
            if let Some(token) = &info.callback_token {
                complete_external(&ctx, domain, token, Some(result.clone()), None).await?;
            }
            Ok(result)
        }
        Err(err) => {
            let message = err.to_string();
            if let Err(status_err) =
                update_status(&ctx, domain, &execution_id, "FAILED", Some(message.clone())).await
            {
                warn!(
                    execution = execution_id,
                    error = %status_err,
                    "failed to record FAILED phase"
                );
            }
            if let Some(token) = &info.callback_token {
                // Never mask the original execution error with a
                // completion error.
                if let Err(completion_err) =
                    complete_external(&ctx, domain, token, None, Some(message)).await
                {
                    warn!(
                        execution = execution_id,
                        error = %completion_err,
                        "failed to complete external activity on failure path"
                    );
                }
            }
            Err(err)
        }
    }
}

async fn update_status(
    ctx: &Arc<dyn WorkflowContext>,
    domain: ExecutionDomain,
    execution_id: &str,
    phase: &str,
    error: Option<String>,
) -> Result<(), OrchestrationError> {
    let update = StatusUpdate {
        execution_id: execution_id.to_string(),
        phase: phase.to_string(),
        error,
    };
    let payload = serde_json::to_string(&update)
        .map_err(|e| OrchestrationError::Payload(format!("status update: {e}")))?;
    ctx.execute_activity(
        domain.orchestrator_queue,
        domain.update_status_activity,
        payload,
        ActivityOptions::short(),
    )
    .await
    .map(|_| ())
}

async fn complete_external(
    ctx: &Arc<dyn WorkflowContext>,
    domain: ExecutionDomain,
    token: &str,
    result: Option<String>,
    error: Option<String>,
) -> Result<(), OrchestrationError> {
    let request = CompletionRequest {
        token: token.to_string(),
        result,
        error,
    };
    let payload = serde_json::to_string(&request)
        .map_err(|e| OrchestrationError::Payload(format!("completion request: {e}")))?;
    ctx.execute_activity(
        domain.orchestrator_queue,
        names::COMPLETE_EXTERNAL_ACTIVITY,
        payload,
        ActivityOptions::short(),
    )
    .await
    .map(|_| ())
}

/// The synchronous validation workflow: hand the serialized definition to
/// the runner's parser and return its verdict.
async fn validation_workflow(ctx: Arc<dyn WorkflowContext>) -> Result<String, OrchestrationError> {
    ctx.execute_activity(
        queues::WORKFLOW_VALIDATION_RUNNER,
        names::VALIDATE_WORKFLOW_DEFINITION,
        ctx.input().to_string(),
        ActivityOptions {
            schedule_to_start: Duration::from_secs(5),
            start_to_close: Duration::from_secs(30),
        },
    )
    .await
}
