//! Task queue names. Wire-level constants shared with the external
//! runner workers; must stay bit-exact.

/// Orchestrator queue for workflow validation (this service).
pub const WORKFLOW_VALIDATION_STIGMER: &str = "workflow_validation_stigmer";
/// Runner queue for workflow validation (external Go engine).
pub const WORKFLOW_VALIDATION_RUNNER: &str = "workflow_validation_runner";

/// Orchestrator queue for workflow execution (this service).
pub const WORKFLOW_EXECUTION_STIGMER: &str = "workflow_execution_stigmer";
/// Runner queue for workflow execution (external Go engine).
pub const WORKFLOW_EXECUTION_RUNNER: &str = "workflow_execution_runner";

/// Orchestrator queue for agent execution (this service).
pub const AGENT_EXECUTION_STIGMER: &str = "agent_execution_stigmer";
/// Runner queue for agent execution (external Python engine).
pub const AGENT_EXECUTION_RUNNER: &str = "agent_execution_runner";
