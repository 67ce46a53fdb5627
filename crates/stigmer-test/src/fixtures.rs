//! Resource fixtures.

use stigmer_api::v1::{
    Agent, AgentExecution, AgentExecutionSpec, AgentSpec, ApiResourceMetadata, EnvVarValue,
    Environment, EnvironmentSpec, SetTask, Workflow, WorkflowSpec, WorkflowTask, workflow_task,
};

fn metadata(name: &str) -> Option<ApiResourceMetadata> {
    Some(ApiResourceMetadata {
        name: name.to_string(),
        org: "acme".to_string(),
        ..Default::default()
    })
}

/// A minimal valid agent.
#[must_use]
pub fn agent(name: &str, instructions: &str) -> Agent {
    Agent {
        metadata: metadata(name),
        spec: Some(AgentSpec {
            instructions: instructions.to_string(),
            ..Default::default()
        }),
        status: None,
    }
}

/// A minimal valid agent execution bound to `instance_ref`.
#[must_use]
pub fn agent_execution(instance_ref: &str, message: &str) -> AgentExecution {
    AgentExecution {
        metadata: Some(ApiResourceMetadata {
            org: "acme".to_string(),
            ..Default::default()
        }),
        spec: Some(AgentExecutionSpec {
            agent_instance_ref: instance_ref.to_string(),
            message: message.to_string(),
            ..Default::default()
        }),
        status: None,
    }
}

/// An environment holding the given values.
#[must_use]
pub fn environment_with(name: &str, data: Vec<(&str, &str, bool)>) -> Environment {
    Environment {
        metadata: metadata(name),
        spec: Some(EnvironmentSpec {
            data: data
                .into_iter()
                .map(|(key, value, is_secret)| {
                    (
                        key.to_string(),
                        EnvVarValue {
                            value: value.to_string(),
                            is_secret,
                        },
                    )
                })
                .collect(),
        }),
        status: None,
    }
}

/// A one-task workflow that sets a value.
#[must_use]
pub fn workflow_with_set_task(name: &str) -> Workflow {
    Workflow {
        metadata: metadata(name),
        spec: Some(WorkflowSpec {
            tasks: vec![WorkflowTask {
                name: "init".to_string(),
                kind: Some(workflow_task::Kind::Set(SetTask {
                    values: [("greeting".to_string(), "hello".to_string())]
                        .into_iter()
                        .collect(),
                })),
            }],
            ..Default::default()
        }),
        status: None,
    }
}
