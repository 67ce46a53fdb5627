//! Control-plane activities.
//!
//! Activities are the only place non-deterministic I/O is allowed. Store
//! access goes through the loopback gRPC clients — the same validated
//! path every external caller takes.

mod agent_execution;
mod system;
mod workflow_execution;

pub use agent_execution::AgentExecutionActivities;
pub use system::SystemActivities;
pub use workflow_execution::WorkflowExecutionActivities;

use crate::error::OrchestrationError;
use stigmer_api::v1::ExecutionPhase;

/// Map a wire phase name onto the proto enum.
pub(crate) fn phase_from_name(name: &str) -> Result<ExecutionPhase, OrchestrationError> {
    match name {
        "PENDING" => Ok(ExecutionPhase::Pending),
        "RUNNING" => Ok(ExecutionPhase::Running),
        "COMPLETED" => Ok(ExecutionPhase::Completed),
        "FAILED" => Ok(ExecutionPhase::Failed),
        "CANCELLED" => Ok(ExecutionPhase::Cancelled),
        other => Err(OrchestrationError::Payload(format!(
            "unknown phase {other:?}"
        ))),
    }
}

/// Map a gRPC failure from a loopback call onto an activity error.
pub(crate) fn status_error(activity: &str, status: &tonic::Status) -> OrchestrationError {
    OrchestrationError::Application {
        activity: activity.to_string(),
        message: status.message().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_names_roundtrip() {
        assert_eq!(phase_from_name("RUNNING").unwrap(), ExecutionPhase::Running);
        assert_eq!(phase_from_name("FAILED").unwrap(), ExecutionPhase::Failed);
        assert!(phase_from_name("EXPLODED").is_err());
    }
}
