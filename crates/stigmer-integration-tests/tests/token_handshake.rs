//! S4: async activity completion via the task-token handshake.
//!
//! An outer workflow's activity creates an AgentExecution carrying its
//! own task token and returns ResultPending, releasing the worker slot.
//! When the execution reaches a terminal phase the orchestrator invokes
//! the completion system activity exactly once, and the outer activity
//! resumes with the execution's result (or its error).

use std::sync::Arc;
use std::time::Duration;

use stigmer_api::v1::ApiResourceId;
use stigmer_orchestration::port::{ActivityOptions, ActivityOutcome, StartWorkflowOptions};
use stigmer_orchestration::{WorkflowService, names, queues};
use stigmer_test::{TestStack, agent, agent_execution};

const OUTER_QUEUE: &str = "zigflow_orchestrator";
const CALL_AGENT: &str = "CallAgent";
const OUTER_WORKFLOW: &str = "outer/invoke-agent";

/// Register the outer workflow and its CallAgent activity: the activity
/// creates an AgentExecution with `spec.callback_token` set to its own
/// task token and returns ResultPending.
fn register_outer(stack: &TestStack) {
    let channel = stack.channel.clone();
    stack.register_runner_activity(
        OUTER_QUEUE,
        CALL_AGENT,
        Arc::new(move |ctx, instance_slug| {
            let channel = channel.clone();
            Box::pin(async move {
                let mut request = agent_execution(&instance_slug, "summarize the build");
                request.spec.as_mut().expect("spec").callback_token = ctx.task_token().to_vec();

                let mut client =
                    stigmer_api::v1::agent_execution_command_controller_client::AgentExecutionCommandControllerClient::new(channel);
                client
                    .create(request)
                    .await
                    .map_err(|status| stigmer_orchestration::OrchestrationError::Application {
                        activity: CALL_AGENT.to_string(),
                        message: status.message().to_string(),
                    })?;
                Ok(ActivityOutcome::ResultPending)
            })
        }),
    );

    stack.registry.register_workflow(
        OUTER_QUEUE,
        OUTER_WORKFLOW,
        Arc::new(|ctx| {
            Box::pin(async move {
                ctx.execute_activity(
                    OUTER_QUEUE,
                    CALL_AGENT,
                    ctx.input().to_string(),
                    ActivityOptions::short(),
                )
                .await
            })
        }),
    );
}

async fn setup_instance(stack: &TestStack) -> String {
    let created_agent = stack
        .agent_command()
        .create(agent("summarizer", "Summarize things"))
        .await
        .unwrap()
        .into_inner();
    let default_instance = created_agent
        .status
        .as_ref()
        .unwrap()
        .default_instance_id
        .clone();
    // The default instance's slug is `<agent>-default`.
    let instance = stack
        .agent_instance_query()
        .get(ApiResourceId {
            value: default_instance,
        })
        .await
        .unwrap()
        .into_inner();
    instance.metadata.as_ref().unwrap().slug.clone()
}

fn outer_options() -> StartWorkflowOptions {
    StartWorkflowOptions {
        workflow_id: "outer-1".to_string(),
        workflow_name: OUTER_WORKFLOW.to_string(),
        task_queue: OUTER_QUEUE.to_string(),
        execution_timeout: Duration::from_secs(30),
    }
}

#[tokio::test]
async fn handshake_resumes_outer_activity_with_result() {
    let stack = TestStack::start().await;
    register_outer(&stack);

    stack.register_runner_activity(
        queues::AGENT_EXECUTION_RUNNER,
        names::RUN_AGENT,
        Arc::new(|_, _| {
            Box::pin(async move { Ok(ActivityOutcome::Completed("summary ready".to_string())) })
        }),
    );

    let instance_slug = setup_instance(&stack).await;
    let result = stack
        .engine
        .execute_workflow(outer_options(), instance_slug)
        .await
        .unwrap();
    assert_eq!(result, "summary ready");
}

#[tokio::test]
async fn handshake_propagates_execution_failure() {
    let stack = TestStack::start().await;
    register_outer(&stack);

    stack.register_runner_activity(
        queues::AGENT_EXECUTION_RUNNER,
        names::RUN_AGENT,
        Arc::new(|_, _| {
            Box::pin(async move {
                Err(stigmer_orchestration::OrchestrationError::Application {
                    activity: names::RUN_AGENT.to_string(),
                    message: "model quota exhausted".to_string(),
                })
            })
        }),
    );

    let instance_slug = setup_instance(&stack).await;
    let err = stack
        .engine
        .execute_workflow(outer_options(), instance_slug)
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("model quota exhausted"), "{message}");

    // The execution's persisted error matches what the outer caller saw.
    let executions = stack
        .agent_execution_query()
        .list(stigmer_api::v1::ListResourcesRequest {
            org: "acme".to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(executions.items.len(), 1);
    let status = executions.items[0].status.as_ref().unwrap();
    assert_eq!(status.phase(), stigmer_api::v1::ExecutionPhase::Failed);
    assert!(status.error.contains("model quota exhausted"));
}
