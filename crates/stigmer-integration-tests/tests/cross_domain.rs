//! S6: in-process cross-domain calls take the full validated path, and
//! a downstream rejection leaves no partial state behind.

use stigmer_api::v1::{
    AgentInstance, AgentInstanceSpec, ApiResourceMetadata, ApiResourceReference, SlugReference,
    api_resource_reference,
};
use stigmer_test::{TestStack, agent, workflow_with_set_task};

#[tokio::test]
async fn invalid_instance_rejected_by_loopback_validation() {
    let stack = TestStack::start().await;

    // Missing agent_ref: the instance controller's validation step
    // rejects it exactly as it would for an external caller.
    let bad = AgentInstance {
        metadata: Some(ApiResourceMetadata {
            name: "dangling".to_string(),
            org: "acme".to_string(),
            ..Default::default()
        }),
        spec: Some(AgentInstanceSpec::default()),
        status: None,
    };
    let status = stack
        .agent_instance_command()
        .create(bad)
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::InvalidArgument);
    assert!(status.message().contains("agent_ref"));

    let listed = stack
        .agent_instance_query()
        .list(stigmer_api::v1::ListResourcesRequest {
            org: "acme".to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    assert!(listed.items.is_empty());
}

#[tokio::test]
async fn failed_default_instance_rolls_back_the_agent() {
    let stack = TestStack::start().await;

    // Occupy the slug the default instance of "reviewer" will want.
    let occupant_agent = stack
        .agent_command()
        .create(agent("occupant", "hold the slug"))
        .await
        .unwrap()
        .into_inner();
    let occupant_id = occupant_agent.metadata.as_ref().unwrap().id.clone();

    let squatter = AgentInstance {
        metadata: Some(ApiResourceMetadata {
            name: "reviewer-default".to_string(),
            org: "acme".to_string(),
            ..Default::default()
        }),
        spec: Some(AgentInstanceSpec {
            agent_ref: occupant_id,
            ..Default::default()
        }),
        status: None,
    };
    stack
        .agent_instance_command()
        .create(squatter)
        .await
        .unwrap();

    // Creating "reviewer" persists the agent, then fails creating its
    // default instance (slug collision through the loopback) and must
    // compensate the agent write away.
    let status = stack
        .agent_command()
        .create(agent("reviewer", "Review PRs"))
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::AlreadyExists);

    let lookup = stack
        .agent_query()
        .get_by_reference(ApiResourceReference {
            handle: Some(api_resource_reference::Handle::SlugRef(SlugReference {
                org: "acme".to_string(),
                slug: "reviewer".to_string(),
            })),
        })
        .await
        .unwrap_err();
    assert_eq!(lookup.code(), tonic::Code::NotFound);
}

#[tokio::test]
async fn workflow_validation_runs_through_the_engine() {
    let stack = TestStack::start().await;

    // The validation runner rejects everything; Workflow.Create must
    // surface INVALID_ARGUMENT and persist nothing.
    stack.register_runner_activity(
        stigmer_orchestration::queues::WORKFLOW_VALIDATION_RUNNER,
        stigmer_orchestration::names::VALIDATE_WORKFLOW_DEFINITION,
        std::sync::Arc::new(|_, _| {
            Box::pin(async move {
                let verdict = serde_json::json!({
                    "valid": false,
                    "message": "task \"init\" uses an unknown function",
                });
                Ok(stigmer_orchestration::port::ActivityOutcome::Completed(
                    verdict.to_string(),
                ))
            })
        }),
    );

    let status = stack
        .workflow_command()
        .create(workflow_with_set_task("pipeline"))
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::InvalidArgument);
    assert!(status.message().contains("unknown function"));
}

#[tokio::test]
async fn workflow_accepted_when_engine_approves() {
    let stack = TestStack::start().await;

    stack.register_runner_activity(
        stigmer_orchestration::queues::WORKFLOW_VALIDATION_RUNNER,
        stigmer_orchestration::names::VALIDATE_WORKFLOW_DEFINITION,
        std::sync::Arc::new(|_, _| {
            Box::pin(async move {
                let verdict = serde_json::json!({ "valid": true, "message": "" });
                Ok(stigmer_orchestration::port::ActivityOutcome::Completed(
                    verdict.to_string(),
                ))
            })
        }),
    );

    let created = stack
        .workflow_command()
        .create(workflow_with_set_task("pipeline"))
        .await
        .unwrap()
        .into_inner();
    assert!(created.metadata.as_ref().unwrap().id.starts_with("wfl-"));
}
