//! Ports over the Temporal SDK surface the control plane consumes:
//! workflow start, worker registration, and async activity completion.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use dashmap::DashMap;
use futures::future::BoxFuture;

use crate::error::OrchestrationError;

/// Options for starting one workflow.
#[derive(Debug, Clone)]
pub struct StartWorkflowOptions {
    /// Workflow id; reuse is rejected (`ReusePolicy = Reject`).
    pub workflow_id: String,
    /// Registered workflow name.
    pub workflow_name: String,
    /// Orchestrator task queue.
    pub task_queue: String,
    /// Overall execution timeout.
    pub execution_timeout: Duration,
}

/// Handle to a started workflow.
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    /// The workflow id.
    pub workflow_id: String,
    /// The run id assigned by the engine.
    pub run_id: String,
}

/// Client surface for starting workflows.
#[async_trait]
pub trait WorkflowService: Send + Sync {
    /// Start a workflow and return immediately.
    async fn start_workflow(
        &self,
        options: StartWorkflowOptions,
        input: String,
    ) -> Result<WorkflowRun, OrchestrationError>;

    /// Start a workflow and wait for its result (used by the synchronous
    /// validation flow).
    async fn execute_workflow(
        &self,
        options: StartWorkflowOptions,
        input: String,
    ) -> Result<String, OrchestrationError>;
}

/// Client surface for completing a paused external activity by token.
#[async_trait]
pub trait ActivityCompletionClient: Send + Sync {
    /// Resume the waiting activity with a successful result.
    async fn complete(&self, task_token: &[u8], result: String)
    -> Result<(), OrchestrationError>;

    /// Resume the waiting activity with an application error.
    async fn fail(&self, task_token: &[u8], error: String) -> Result<(), OrchestrationError>;
}

/// Per-activity scheduling options.
#[derive(Debug, Clone)]
pub struct ActivityOptions {
    /// Time allowed between scheduling and pickup by a worker.
    pub schedule_to_start: Duration,
    /// Time allowed for the activity to run (including a pending async
    /// completion).
    pub start_to_close: Duration,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            schedule_to_start: Duration::from_secs(10),
            start_to_close: Duration::from_secs(30 * 60),
        }
    }
}

impl ActivityOptions {
    /// Options for quick control-plane activities.
    #[must_use]
    pub fn short() -> Self {
        Self {
            schedule_to_start: Duration::from_secs(10),
            start_to_close: Duration::from_secs(60),
        }
    }

    /// Override the start-to-close budget.
    #[must_use]
    pub fn with_start_to_close(mut self, timeout: Duration) -> Self {
        self.start_to_close = timeout;
        self
    }
}

/// Deterministic context handed to workflow handlers. All I/O goes
/// through [`WorkflowContext::execute_activity`]; workflow code itself
/// must stay deterministic.
#[async_trait]
pub trait WorkflowContext: Send + Sync {
    /// The workflow input payload.
    fn input(&self) -> &str;

    /// The id of this workflow.
    fn workflow_id(&self) -> &str;

    /// Schedule an activity on a queue and await its result.
    async fn execute_activity(
        &self,
        queue: &str,
        activity: &str,
        input: String,
        options: ActivityOptions,
    ) -> Result<String, OrchestrationError>;
}

/// Context handed to activity handlers.
#[derive(Debug, Clone)]
pub struct ActivityContext {
    task_token: Vec<u8>,
    activity: String,
    queue: String,
}

impl ActivityContext {
    /// Create a context (engine-internal).
    #[must_use]
    pub fn new(task_token: Vec<u8>, activity: String, queue: String) -> Self {
        Self {
            task_token,
            activity,
            queue,
        }
    }

    /// The opaque task token identifying this activity invocation.
    #[must_use]
    pub fn task_token(&self) -> &[u8] {
        &self.task_token
    }

    /// Activity name.
    #[must_use]
    pub fn activity(&self) -> &str {
        &self.activity
    }

    /// Queue the activity was dispatched on.
    #[must_use]
    pub fn queue(&self) -> &str {
        &self.queue
    }
}

/// Result of one activity handler invocation.
#[derive(Debug)]
pub enum ActivityOutcome {
    /// The activity finished with this payload.
    Completed(String),
    /// The activity's result will arrive later via
    /// [`ActivityCompletionClient`] with this invocation's task token;
    /// the worker slot is released immediately.
    ResultPending,
}

/// Boxed activity handler.
pub type ActivityHandler = Arc<
    dyn Fn(ActivityContext, String) -> BoxFuture<'static, Result<ActivityOutcome, OrchestrationError>>
        + Send
        + Sync,
>;

/// Boxed workflow handler.
pub type WorkflowHandler = Arc<
    dyn Fn(Arc<dyn WorkflowContext>) -> BoxFuture<'static, Result<String, OrchestrationError>>
        + Send
        + Sync,
>;

/// Registry binding workflow and activity names to handlers per queue.
///
/// The control plane registers its orchestrator workflows and system
/// activities here; external runners own the runner queues (tests
/// register fakes).
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    workflows: Arc<DashMap<(String, String), WorkflowHandler>>,
    activities: Arc<DashMap<(String, String), ActivityHandler>>,
}

impl WorkerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a workflow handler under an explicit name.
    pub fn register_workflow(&self, queue: &str, name: &str, handler: WorkflowHandler) {
        self.workflows
            .insert((queue.to_string(), name.to_string()), handler);
    }

    /// Register an activity handler under an explicit name.
    pub fn register_activity(&self, queue: &str, name: &str, handler: ActivityHandler) {
        self.activities
            .insert((queue.to_string(), name.to_string()), handler);
    }

    /// Look up a workflow handler.
    #[must_use]
    pub fn workflow(&self, queue: &str, name: &str) -> Option<WorkflowHandler> {
        self.workflows
            .get(&(queue.to_string(), name.to_string()))
            .map(|h| Arc::clone(&h))
    }

    /// Look up an activity handler.
    #[must_use]
    pub fn activity(&self, queue: &str, name: &str) -> Option<ActivityHandler> {
        self.activities
            .get(&(queue.to_string(), name.to_string()))
            .map(|h| Arc::clone(&h))
    }
}

impl std::fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("workflows", &self.workflows.len())
            .field("activities", &self.activities.len())
            .finish()
    }
}

/// Truncated base64 preview of a task token, safe for logs. Tokens are
/// never logged in full.
#[must_use]
pub fn token_preview(token: &[u8]) -> String {
    BASE64.encode(token).chars().take(20).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_preview_is_truncated() {
        let token = vec![0xAB; 64];
        let preview = token_preview(&token);
        assert_eq!(preview.len(), 20);
        assert!(BASE64.encode(&token).starts_with(&preview));
    }

    #[test]
    fn registry_lookup_by_queue_and_name() {
        let registry = WorkerRegistry::new();
        registry.register_activity(
            "q1",
            "DoThing",
            Arc::new(|_, input| {
                Box::pin(async move { Ok(ActivityOutcome::Completed(input)) })
            }),
        );
        assert!(registry.activity("q1", "DoThing").is_some());
        assert!(registry.activity("q2", "DoThing").is_none());
        assert!(registry.activity("q1", "Other").is_none());
    }
}
