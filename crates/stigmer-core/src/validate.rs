//! Request validation.
//!
//! Every request type accepted by a controller implements [`Validate`];
//! the pipeline's validation step runs it first and maps failures to
//! `INVALID_ARGUMENT`.

use stigmer_api::v1::{
    Agent, AgentExecution, AgentInstance, AgentSpec, ApiResourceId, ApiResourceReference,
    Environment, ExecutionContext, Session, Skill, UpdateAgentExecutionStatusRequest,
    UpdateWorkflowExecutionStatusRequest, Workflow, WorkflowExecution, WorkflowInstance,
    WorkflowTask, api_resource_reference, skill_spec, workflow_task,
};

/// A request field that failed validation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// What the field must satisfy.
    pub message: String,
}

impl ValidationError {
    /// Create a new violation.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validated request types. The first violation wins.
pub trait Validate {
    /// Check the request, returning the first violation found.
    fn validate(&self) -> Result<(), ValidationError>;
}

fn non_empty(value: &str, field: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }
    Ok(())
}

fn named_metadata<R: stigmer_api::Resource>(resource: &R) -> Result<(), ValidationError> {
    let meta = resource
        .meta()
        .ok_or_else(|| ValidationError::new("metadata", "must be set"))?;
    non_empty(&meta.name, "metadata.name")?;
    non_empty(&meta.org, "metadata.org")?;
    if crate::slug::slugify(&meta.name).is_empty() {
        return Err(ValidationError::new(
            "metadata.name",
            "must contain at least one alphanumeric character",
        ));
    }
    Ok(())
}

// Executions are rarely named by callers; the controller defaults the
// name to the generated id. Only the org label is mandatory.
fn org_metadata<R: stigmer_api::Resource>(resource: &R) -> Result<(), ValidationError> {
    let meta = resource
        .meta()
        .ok_or_else(|| ValidationError::new("metadata", "must be set"))?;
    non_empty(&meta.org, "metadata.org")
}

// An expression field holds either a literal or a `${jq-expr}` string.
fn expression(value: &str, field: &str) -> Result<(), ValidationError> {
    if value.starts_with("${") && !value.ends_with('}') {
        return Err(ValidationError::new(field, "unterminated ${...} expression"));
    }
    Ok(())
}

fn agent_spec(spec: &AgentSpec, path: &str) -> Result<(), ValidationError> {
    non_empty(&spec.instructions, &format!("{path}.instructions"))?;
    for (i, usage) in spec.mcp_server_usages.iter().enumerate() {
        let usage_path = format!("{path}.mcp_server_usages[{i}]");
        non_empty(&usage.name, &format!("{usage_path}.name"))?;
        let server = usage
            .server
            .as_ref()
            .ok_or_else(|| ValidationError::new(format!("{usage_path}.server"), "must be set"))?;
        if server.transport.is_none() {
            return Err(ValidationError::new(
                format!("{usage_path}.server.transport"),
                "exactly one of stdio, http or docker must be set",
            ));
        }
    }
    for (i, sub) in spec.sub_agents.iter().enumerate() {
        let sub_path = format!("{path}.sub_agents[{i}]");
        non_empty(&sub.name, &format!("{sub_path}.name"))?;
        match &sub.source {
            None => {
                return Err(ValidationError::new(
                    format!("{sub_path}.source"),
                    "either inline or reference must be set",
                ));
            }
            Some(stigmer_api::v1::sub_agent::Source::Inline(inline)) => {
                agent_spec(inline, &format!("{sub_path}.inline"))?;
            }
            Some(stigmer_api::v1::sub_agent::Source::Reference(reference)) => {
                non_empty(reference, &format!("{sub_path}.reference"))?;
            }
        }
    }
    Ok(())
}

impl Validate for Agent {
    fn validate(&self) -> Result<(), ValidationError> {
        named_metadata(self)?;
        let spec = self
            .spec
            .as_ref()
            .ok_or_else(|| ValidationError::new("spec", "must be set"))?;
        agent_spec(spec, "spec")
    }
}

impl Validate for AgentInstance {
    fn validate(&self) -> Result<(), ValidationError> {
        named_metadata(self)?;
        let spec = self
            .spec
            .as_ref()
            .ok_or_else(|| ValidationError::new("spec", "must be set"))?;
        non_empty(&spec.agent_ref, "spec.agent_ref")?;
        for (i, env_ref) in spec.environment_refs.iter().enumerate() {
            non_empty(env_ref, &format!("spec.environment_refs[{i}]"))?;
        }
        Ok(())
    }
}

impl Validate for AgentExecution {
    fn validate(&self) -> Result<(), ValidationError> {
        org_metadata(self)?;
        let spec = self
            .spec
            .as_ref()
            .ok_or_else(|| ValidationError::new("spec", "must be set"))?;
        non_empty(&spec.agent_instance_ref, "spec.agent_instance_ref")?;
        non_empty(&spec.message, "spec.message")
    }
}

fn collect_task_names<'a>(
    tasks: &'a [WorkflowTask],
    path: &str,
    seen: &mut std::collections::HashSet<&'a str>,
) -> Result<(), ValidationError> {
    for (i, task) in tasks.iter().enumerate() {
        let task_path = format!("{path}[{i}]");
        non_empty(&task.name, &format!("{task_path}.name"))?;
        if !seen.insert(task.name.as_str()) {
            return Err(ValidationError::new(
                format!("{task_path}.name"),
                format!("duplicate task name {:?}", task.name),
            ));
        }
        let kind = task.kind.as_ref().ok_or_else(|| {
            ValidationError::new(format!("{task_path}.kind"), "task kind must be set")
        })?;
        match kind {
            workflow_task::Kind::Set(set) => {
                for (key, value) in &set.values {
                    expression(value, &format!("{task_path}.set.values[{key}]"))?;
                }
            }
            workflow_task::Kind::HttpCall(call) => {
                non_empty(&call.method, &format!("{task_path}.http_call.method"))?;
                non_empty(&call.url, &format!("{task_path}.http_call.url"))?;
                expression(&call.url, &format!("{task_path}.http_call.url"))?;
                expression(&call.body, &format!("{task_path}.http_call.body"))?;
            }
            workflow_task::Kind::GrpcCall(call) => {
                non_empty(&call.service, &format!("{task_path}.grpc_call.service"))?;
                non_empty(&call.method, &format!("{task_path}.grpc_call.method"))?;
                expression(&call.request_json, &format!("{task_path}.grpc_call.request_json"))?;
            }
            workflow_task::Kind::AgentCall(call) => {
                non_empty(&call.agent, &format!("{task_path}.agent_call.agent"))?;
                expression(&call.message, &format!("{task_path}.agent_call.message"))?;
            }
            workflow_task::Kind::CallActivity(call) => {
                non_empty(&call.activity, &format!("{task_path}.call_activity.activity"))?;
            }
            workflow_task::Kind::ForEach(for_each) => {
                non_empty(&for_each.items, &format!("{task_path}.for_each.items"))?;
                expression(&for_each.items, &format!("{task_path}.for_each.items"))?;
                collect_task_names(&for_each.tasks, &format!("{task_path}.for_each.tasks"), seen)?;
            }
            workflow_task::Kind::Fork(fork) => {
                for (b, branch) in fork.branches.iter().enumerate() {
                    collect_task_names(
                        &branch.tasks,
                        &format!("{task_path}.fork.branches[{b}].tasks"),
                        seen,
                    )?;
                }
            }
            workflow_task::Kind::Switch(switch) => {
                for (c, case) in switch.cases.iter().enumerate() {
                    expression(&case.when, &format!("{task_path}.switch.cases[{c}].when"))?;
                }
            }
            workflow_task::Kind::TryCatch(try_catch) => {
                collect_task_names(&try_catch.tasks, &format!("{task_path}.try_catch.tasks"), seen)?;
                collect_task_names(
                    &try_catch.catch_tasks,
                    &format!("{task_path}.try_catch.catch_tasks"),
                    seen,
                )?;
            }
            workflow_task::Kind::Raise(raise) => {
                non_empty(&raise.error_type, &format!("{task_path}.raise.error_type"))?;
            }
            workflow_task::Kind::Run(run) => {
                non_empty(&run.command, &format!("{task_path}.run.command"))?;
            }
            workflow_task::Kind::Wait(wait) => {
                non_empty(&wait.duration, &format!("{task_path}.wait.duration"))?;
            }
            workflow_task::Kind::Listen(listen) => {
                non_empty(&listen.event, &format!("{task_path}.listen.event"))?;
            }
        }
    }
    Ok(())
}

impl Validate for Workflow {
    fn validate(&self) -> Result<(), ValidationError> {
        named_metadata(self)?;
        let spec = self
            .spec
            .as_ref()
            .ok_or_else(|| ValidationError::new("spec", "must be set"))?;
        if spec.tasks.is_empty() {
            return Err(ValidationError::new("spec.tasks", "must not be empty"));
        }
        let mut seen = std::collections::HashSet::new();
        collect_task_names(&spec.tasks, "spec.tasks", &mut seen)
    }
}

impl Validate for WorkflowInstance {
    fn validate(&self) -> Result<(), ValidationError> {
        named_metadata(self)?;
        let spec = self
            .spec
            .as_ref()
            .ok_or_else(|| ValidationError::new("spec", "must be set"))?;
        non_empty(&spec.workflow_ref, "spec.workflow_ref")?;
        for (i, env_ref) in spec.environment_refs.iter().enumerate() {
            non_empty(env_ref, &format!("spec.environment_refs[{i}]"))?;
        }
        Ok(())
    }
}

impl Validate for WorkflowExecution {
    fn validate(&self) -> Result<(), ValidationError> {
        org_metadata(self)?;
        let spec = self
            .spec
            .as_ref()
            .ok_or_else(|| ValidationError::new("spec", "must be set"))?;
        non_empty(&spec.workflow_instance_ref, "spec.workflow_instance_ref")
    }
}

impl Validate for Skill {
    fn validate(&self) -> Result<(), ValidationError> {
        named_metadata(self)?;
        let spec = self
            .spec
            .as_ref()
            .ok_or_else(|| ValidationError::new("spec", "must be set"))?;
        match &spec.source {
            None => Err(ValidationError::new(
                "spec.source",
                "either markdown or reference must be set",
            )),
            Some(skill_spec::Source::Markdown(markdown)) => {
                non_empty(markdown, "spec.markdown")
            }
            Some(skill_spec::Source::Reference(reference)) => {
                non_empty(reference, "spec.reference")
            }
        }
    }
}

impl Validate for Session {
    fn validate(&self) -> Result<(), ValidationError> {
        named_metadata(self)
    }
}

impl Validate for Environment {
    fn validate(&self) -> Result<(), ValidationError> {
        named_metadata(self)?;
        let spec = self
            .spec
            .as_ref()
            .ok_or_else(|| ValidationError::new("spec", "must be set"))?;
        for key in spec.data.keys() {
            if key.trim().is_empty() {
                return Err(ValidationError::new("spec.data", "keys must not be empty"));
            }
        }
        Ok(())
    }
}

impl Validate for ExecutionContext {
    fn validate(&self) -> Result<(), ValidationError> {
        let spec = self
            .spec
            .as_ref()
            .ok_or_else(|| ValidationError::new("spec", "must be set"))?;
        non_empty(&spec.execution_id, "spec.execution_id")
    }
}

impl Validate for ApiResourceId {
    fn validate(&self) -> Result<(), ValidationError> {
        non_empty(&self.value, "value")?;
        if crate::id::parse_id(&self.value).is_none() {
            return Err(ValidationError::new("value", "malformed resource id"));
        }
        Ok(())
    }
}

impl Validate for ApiResourceReference {
    fn validate(&self) -> Result<(), ValidationError> {
        match &self.handle {
            None => Err(ValidationError::new(
                "handle",
                "either id or slug_ref must be set",
            )),
            Some(api_resource_reference::Handle::Id(id)) => non_empty(id, "id"),
            Some(api_resource_reference::Handle::SlugRef(slug_ref)) => {
                non_empty(&slug_ref.org, "slug_ref.org")?;
                non_empty(&slug_ref.slug, "slug_ref.slug")
            }
        }
    }
}

impl Validate for UpdateAgentExecutionStatusRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        non_empty(&self.execution_id, "execution_id")?;
        if self.status.is_none() {
            return Err(ValidationError::new("status", "must be set"));
        }
        Ok(())
    }
}

impl Validate for UpdateWorkflowExecutionStatusRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        non_empty(&self.execution_id, "execution_id")?;
        if self.status.is_none() {
            return Err(ValidationError::new("status", "must be set"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stigmer_api::v1::{
        AgentExecutionSpec, AgentSpec, ApiResourceMetadata, SetTask, WorkflowSpec,
    };

    fn metadata(name: &str) -> Option<ApiResourceMetadata> {
        Some(ApiResourceMetadata {
            name: name.to_string(),
            org: "acme".to_string(),
            ..Default::default()
        })
    }

    fn set_task(name: &str) -> WorkflowTask {
        WorkflowTask {
            name: name.to_string(),
            kind: Some(workflow_task::Kind::Set(SetTask::default())),
        }
    }

    #[test]
    fn agent_requires_instructions() {
        let agent = Agent {
            metadata: metadata("reviewer"),
            spec: Some(AgentSpec::default()),
            status: None,
        };
        let err = agent.validate().unwrap_err();
        assert_eq!(err.field, "spec.instructions");
    }

    #[test]
    fn agent_with_instructions_passes() {
        let agent = Agent {
            metadata: metadata("reviewer"),
            spec: Some(AgentSpec {
                instructions: "Review PRs".to_string(),
                ..Default::default()
            }),
            status: None,
        };
        assert!(agent.validate().is_ok());
    }

    #[test]
    fn missing_org_rejected() {
        let agent = Agent {
            metadata: Some(ApiResourceMetadata {
                name: "reviewer".to_string(),
                ..Default::default()
            }),
            spec: Some(AgentSpec {
                instructions: "x".to_string(),
                ..Default::default()
            }),
            status: None,
        };
        assert_eq!(agent.validate().unwrap_err().field, "metadata.org");
    }

    #[test]
    fn workflow_rejects_duplicate_task_names() {
        let workflow = Workflow {
            metadata: metadata("pipeline"),
            spec: Some(WorkflowSpec {
                tasks: vec![set_task("a"), set_task("a")],
                ..Default::default()
            }),
            status: None,
        };
        let err = workflow.validate().unwrap_err();
        assert!(err.message.contains("duplicate"));
    }

    #[test]
    fn workflow_rejects_unterminated_expression() {
        let mut task = set_task("a");
        task.kind = Some(workflow_task::Kind::Set(SetTask {
            values: [("x".to_string(), "${ .input".to_string())].into_iter().collect(),
        }));
        let workflow = Workflow {
            metadata: metadata("pipeline"),
            spec: Some(WorkflowSpec {
                tasks: vec![task],
                ..Default::default()
            }),
            status: None,
        };
        let err = workflow.validate().unwrap_err();
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn execution_requires_instance_ref_and_message() {
        let execution = AgentExecution {
            metadata: metadata("run-1"),
            spec: Some(AgentExecutionSpec {
                agent_instance_ref: "ain-1".to_string(),
                ..Default::default()
            }),
            status: None,
        };
        assert_eq!(execution.validate().unwrap_err().field, "spec.message");
    }

    #[test]
    fn id_shape_checked() {
        assert!(ApiResourceId { value: "agt-01J8".to_string() }.validate().is_ok());
        assert!(ApiResourceId { value: "garbage".to_string() }.validate().is_err());
        assert!(ApiResourceId { value: String::new() }.validate().is_err());
    }
}
