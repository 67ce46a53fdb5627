//! Kind registry: id prefixes, storage prefixes and display names.

use crate::v1::ApiResourceKind;

impl ApiResourceKind {
    /// Every kind served by the control plane, in declaration order.
    pub const ALL: [ApiResourceKind; 10] = [
        ApiResourceKind::Agent,
        ApiResourceKind::AgentInstance,
        ApiResourceKind::AgentExecution,
        ApiResourceKind::Workflow,
        ApiResourceKind::WorkflowInstance,
        ApiResourceKind::WorkflowExecution,
        ApiResourceKind::Skill,
        ApiResourceKind::Session,
        ApiResourceKind::Environment,
        ApiResourceKind::ExecutionContext,
    ];

    /// Prefix used when generating ids for this kind, e.g. `agt-01H...`.
    #[must_use]
    pub fn id_prefix(self) -> &'static str {
        match self {
            ApiResourceKind::Agent => "agt",
            ApiResourceKind::AgentInstance => "ain",
            ApiResourceKind::AgentExecution => "aex",
            ApiResourceKind::Workflow => "wfl",
            ApiResourceKind::WorkflowInstance => "win",
            ApiResourceKind::WorkflowExecution => "wex",
            ApiResourceKind::Skill => "skl",
            ApiResourceKind::Session => "ses",
            ApiResourceKind::Environment => "env",
            ApiResourceKind::ExecutionContext => "ecx",
            ApiResourceKind::Unspecified => "res",
        }
    }

    /// Store key prefix for this kind; resources live under
    /// `{storage_prefix}/{id}`.
    #[must_use]
    pub fn storage_prefix(self) -> &'static str {
        match self {
            ApiResourceKind::Agent => "agent",
            ApiResourceKind::AgentInstance => "agent_instance",
            ApiResourceKind::AgentExecution => "agent_execution",
            ApiResourceKind::Workflow => "workflow",
            ApiResourceKind::WorkflowInstance => "workflow_instance",
            ApiResourceKind::WorkflowExecution => "workflow_execution",
            ApiResourceKind::Skill => "skill",
            ApiResourceKind::Session => "session",
            ApiResourceKind::Environment => "environment",
            ApiResourceKind::ExecutionContext => "execution_context",
            ApiResourceKind::Unspecified => "resource",
        }
    }

    /// Kubernetes-style kind name, e.g. `AgentExecution`.
    #[must_use]
    pub fn kind_name(self) -> &'static str {
        match self {
            ApiResourceKind::Agent => "Agent",
            ApiResourceKind::AgentInstance => "AgentInstance",
            ApiResourceKind::AgentExecution => "AgentExecution",
            ApiResourceKind::Workflow => "Workflow",
            ApiResourceKind::WorkflowInstance => "WorkflowInstance",
            ApiResourceKind::WorkflowExecution => "WorkflowExecution",
            ApiResourceKind::Skill => "Skill",
            ApiResourceKind::Session => "Session",
            ApiResourceKind::Environment => "Environment",
            ApiResourceKind::ExecutionContext => "ExecutionContext",
            ApiResourceKind::Unspecified => "Unspecified",
        }
    }
}

impl std::fmt::Display for ApiResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_prefixes_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for kind in ApiResourceKind::ALL {
            assert!(seen.insert(kind.id_prefix()), "duplicate prefix for {kind}");
        }
    }

    #[test]
    fn storage_prefixes_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for kind in ApiResourceKind::ALL {
            assert!(seen.insert(kind.storage_prefix()));
        }
    }

    #[test]
    fn display_matches_kind_name() {
        assert_eq!(ApiResourceKind::AgentExecution.to_string(), "AgentExecution");
    }
}
