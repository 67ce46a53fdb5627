//! Workflow and activity registration names.
//!
//! Workflows register under explicit string names (not generated method
//! names) so cross-language naming stays stable. The first four are
//! wire-level and must stay bit-exact.

/// Workflow validation orchestrator workflow.
pub const VALIDATE_WORKFLOW: &str = "ValidateWorkflow";
/// Workflow execution orchestrator workflow.
pub const WORKFLOW_EXECUTION_INVOKE: &str = "stigmer/workflow-execution/invoke";
/// Agent execution orchestrator workflow.
pub const AGENT_EXECUTION_INVOKE: &str = "stigmer/agent-execution/invoke";
/// System activity completing an external activity by task token.
pub const COMPLETE_EXTERNAL_ACTIVITY: &str = "stigmer/system/complete-external-activity";

/// Control-plane activity: fetch an agent execution by id.
pub const GET_AGENT_EXECUTION: &str = "GetAgentExecution";
/// Control-plane activity: write an agent execution's status.
pub const UPDATE_AGENT_EXECUTION_STATUS: &str = "UpdateAgentExecutionStatus";
/// Runner activity: run the agent loop for one execution.
pub const RUN_AGENT: &str = "RunAgent";

/// Control-plane activity: fetch a workflow execution by id.
pub const GET_WORKFLOW_EXECUTION: &str = "GetWorkflowExecution";
/// Control-plane activity: write a workflow execution's status.
pub const UPDATE_WORKFLOW_EXECUTION_STATUS: &str = "UpdateWorkflowExecutionStatus";
/// Runner activity: interpret one workflow execution.
pub const RUN_WORKFLOW: &str = "RunWorkflow";

/// Runner activity: parse and validate a workflow definition.
pub const VALIDATE_WORKFLOW_DEFINITION: &str = "ValidateWorkflowDefinition";
