//! S3: secret environment material flows into the ExecutionContext and
//! never into Temporal inputs or the serialized store bytes. Plus the
//! ExecutionContext lifecycle and the degraded-mode contract.

use std::sync::Arc;
use std::time::Duration;

use stigmer_api::v1::{
    AgentInstance, AgentInstanceSpec, ApiResourceId, ApiResourceMetadata, ExecutionPhase,
};
use stigmer_orchestration::port::ActivityOutcome;
use stigmer_orchestration::{names, queues};
use stigmer_store::KvStore;
use stigmer_test::{TestStack, agent, agent_execution, environment_with};

fn instance_for(agent_id: &str, env_refs: Vec<&str>) -> AgentInstance {
    AgentInstance {
        metadata: Some(ApiResourceMetadata {
            name: "reviewer-prod".to_string(),
            org: "acme".to_string(),
            ..Default::default()
        }),
        spec: Some(AgentInstanceSpec {
            agent_ref: agent_id.to_string(),
            environment_refs: env_refs.into_iter().map(String::from).collect(),
            overrides: Default::default(),
        }),
        status: None,
    }
}

async fn wait_for_phase(
    stack: &TestStack,
    execution_id: &str,
    phase: ExecutionPhase,
) -> stigmer_api::v1::AgentExecution {
    let mut query = stack.agent_execution_query();
    for _ in 0..100 {
        let execution = query
            .get(ApiResourceId {
                value: execution_id.to_string(),
            })
            .await
            .unwrap()
            .into_inner();
        if execution.status.as_ref().map(|s| s.phase()) == Some(phase) {
            return execution;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("execution {execution_id} never reached {phase:?}");
}

#[tokio::test]
async fn secret_env_reaches_context_but_never_temporal_or_disk() {
    let stack = TestStack::start().await;

    // The fake runner captures its Temporal input and parks until the
    // test releases it, so the ExecutionContext is observable mid-run.
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
    let release_rx = Arc::new(tokio::sync::Mutex::new(Some(release_rx)));
    let captured_input: Arc<std::sync::Mutex<Option<String>>> =
        Arc::new(std::sync::Mutex::new(None));
    let capture = Arc::clone(&captured_input);
    stack.register_runner_activity(
        queues::AGENT_EXECUTION_RUNNER,
        names::RUN_AGENT,
        Arc::new(move |_, input| {
            let capture = Arc::clone(&capture);
            let release_rx = Arc::clone(&release_rx);
            Box::pin(async move {
                *capture.lock().unwrap() = Some(input);
                if let Some(rx) = release_rx.lock().await.take() {
                    let _ = rx.await;
                }
                Ok(ActivityOutcome::Completed("agent done".to_string()))
            })
        }),
    );

    // Environment with a secret, instance bound to it, then the run.
    let environment = stack
        .environment_command()
        .create(environment_with(
            "prod",
            vec![("GITHUB_TOKEN", "ghp_abc", true)],
        ))
        .await
        .unwrap()
        .into_inner();
    let env_id = environment.metadata.as_ref().unwrap().id.clone();

    let created_agent = stack
        .agent_command()
        .create(agent("reviewer", "Review PRs"))
        .await
        .unwrap()
        .into_inner();
    let agent_id = created_agent.metadata.as_ref().unwrap().id.clone();

    stack
        .agent_instance_command()
        .create(instance_for(&agent_id, vec!["prod"]))
        .await
        .unwrap();

    let mut request = agent_execution("reviewer-prod", "review this");
    request
        .spec
        .as_mut()
        .unwrap()
        .runtime_env
        .insert("LOG_LEVEL".to_string(), "debug".to_string());
    let execution = stack
        .agent_execution_command()
        .create(request)
        .await
        .unwrap()
        .into_inner();
    let execution_id = execution.metadata.as_ref().unwrap().id.clone();

    // The context carries the decrypted secret and the runtime override.
    let context = stack
        .execution_context_query()
        .get(ApiResourceId {
            value: execution_id.clone(),
        })
        .await
        .unwrap()
        .into_inner();
    let env = &context.spec.as_ref().unwrap().env;
    assert_eq!(env["GITHUB_TOKEN"].value, "ghp_abc");
    assert!(env["GITHUB_TOKEN"].is_secret);
    assert_eq!(env["LOG_LEVEL"].value, "debug");

    // The stored environment bytes hold only ciphertext.
    let raw = stack
        .kv
        .get(&format!("environment/{env_id}"))
        .await
        .unwrap()
        .unwrap();
    assert!(!raw.windows(7).any(|w| w == b"ghp_abc"));

    // A session was auto-created.
    let sessions = stack
        .session_query()
        .list(stigmer_api::v1::ListResourcesRequest {
            org: "acme".to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(sessions.items.len(), 1);

    // The Temporal input for the runner is the execution id alone.
    for _ in 0..100 {
        if captured_input.lock().unwrap().is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let input = captured_input.lock().unwrap().clone().expect("runner invoked");
    assert_eq!(input, execution_id);
    assert!(!input.contains("ghp_abc"));

    // Release the runner; the execution completes and the context is
    // torn down.
    release_tx.send(()).unwrap();
    wait_for_phase(&stack, &execution_id, ExecutionPhase::Completed).await;

    let mut context_query = stack.execution_context_query();
    let mut dropped = false;
    for _ in 0..100 {
        match context_query
            .get(ApiResourceId {
                value: execution_id.clone(),
            })
            .await
        {
            Err(status) if status.code() == tonic::Code::NotFound => {
                dropped = true;
                break;
            }
            _ => tokio::time::sleep(Duration::from_millis(50)).await,
        }
    }
    assert!(dropped, "execution context survived the terminal phase");
}

#[tokio::test]
async fn missing_environment_ref_is_failed_precondition() {
    let stack = TestStack::start().await;

    let created_agent = stack
        .agent_command()
        .create(agent("reviewer", "Review PRs"))
        .await
        .unwrap()
        .into_inner();
    let agent_id = created_agent.metadata.as_ref().unwrap().id.clone();

    let status = stack
        .agent_instance_command()
        .create(instance_for(&agent_id, vec!["nonexistent-env"]))
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::FailedPrecondition);
}

#[tokio::test]
async fn degraded_mode_leaves_execution_pending_and_serves_reads() {
    let stack = TestStack::start_degraded().await;

    let created_agent = stack
        .agent_command()
        .create(agent("reviewer", "Review PRs"))
        .await
        .unwrap()
        .into_inner();
    let agent_id = created_agent.metadata.as_ref().unwrap().id.clone();

    stack
        .agent_instance_command()
        .create(instance_for(&agent_id, vec![]))
        .await
        .unwrap();

    let execution = stack
        .agent_execution_command()
        .create(agent_execution("reviewer-prod", "hello"))
        .await
        .unwrap()
        .into_inner();
    let execution_id = execution.metadata.as_ref().unwrap().id.clone();

    // No Temporal: the execution persists in PENDING and reads work.
    let fetched = stack
        .agent_execution_query()
        .get(ApiResourceId {
            value: execution_id,
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(fetched.status.as_ref().unwrap().phase(), ExecutionPhase::Pending);
    assert!(fetched.status.as_ref().unwrap().temporal_workflow_id.is_empty());
}
