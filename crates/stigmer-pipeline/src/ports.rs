//! Ports consumed by standard steps and implemented by the orchestration
//! layer. Both are optional at wiring time: when Temporal is not
//! connected, the steps degrade gracefully.

use async_trait::async_trait;
use stigmer_api::v1::Workflow;

use crate::error::PipelineError;

/// Starts the Temporal workflow that drives one execution. Implemented by
/// the per-domain workflow creators.
#[async_trait]
pub trait ExecutionStarter: Send + Sync {
    /// The workflow id the start call will use. Deterministic, so the
    /// execution can record it before the workflow begins touching the
    /// store.
    fn workflow_id_for(&self, execution_id: &str) -> String {
        execution_id.to_string()
    }

    /// Start the workflow for `execution_id`, returning the Temporal
    /// workflow id.
    ///
    /// The input is the execution id alone; the merged environment never
    /// crosses this boundary.
    async fn start(&self, execution_id: &str, has_callback: bool)
    -> Result<String, PipelineError>;
}

/// Validates a workflow spec by running the synchronous validation
/// workflow (proto → YAML → engine parse) with a short timeout.
#[async_trait]
pub trait WorkflowSpecValidator: Send + Sync {
    /// Validate; returns `InvalidArgument` when the engine rejects the
    /// spec, `DeadlineExceeded` when validation does not finish in time.
    async fn validate(&self, workflow: &Workflow) -> Result<(), PipelineError>;
}
