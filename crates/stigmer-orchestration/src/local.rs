//! In-process workflow engine implementing the Temporal-facing ports.
//!
//! Used by the dev daemon and by every orchestration test. Workflows run
//! on tokio tasks; activities are dispatched by `(queue, name)` against
//! the worker registry; `ResultPending` activities park on a token-keyed
//! waiter resumed by the completion client. The production Temporal
//! adapter implements the same ports out of process.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{oneshot, watch};
use tracing::debug;

use crate::error::{OrchestrationError, TimeoutType};
use crate::port::{
    ActivityCompletionClient, ActivityContext, ActivityOptions, ActivityOutcome,
    StartWorkflowOptions, WorkerRegistry, WorkflowContext, WorkflowRun, WorkflowService,
    token_preview,
};

type WorkflowResult = Option<Result<String, String>>;

struct RunRecord {
    run_id: String,
    result: watch::Receiver<WorkflowResult>,
}

struct EngineInner {
    registry: WorkerRegistry,
    runs: DashMap<String, RunRecord>,
    pending: DashMap<String, oneshot::Sender<Result<String, OrchestrationError>>>,
    token_counter: AtomicU64,
}

/// The in-process engine. Cheap to clone; one per process.
#[derive(Clone)]
pub struct LocalEngine {
    inner: Arc<EngineInner>,
}

impl LocalEngine {
    /// Create an engine over a worker registry.
    #[must_use]
    pub fn new(registry: WorkerRegistry) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                registry,
                runs: DashMap::new(),
                pending: DashMap::new(),
                token_counter: AtomicU64::new(1),
            }),
        }
    }

    /// The registry workflows and activities are registered in.
    #[must_use]
    pub fn registry(&self) -> &WorkerRegistry {
        &self.inner.registry
    }
}

impl std::fmt::Debug for LocalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEngine")
            .field("runs", &self.inner.runs.len())
            .field("pending", &self.inner.pending.len())
            .finish()
    }
}

struct LocalWorkflowContext {
    engine: Arc<EngineInner>,
    workflow_id: String,
    input: String,
}

#[async_trait]
impl WorkflowContext for LocalWorkflowContext {
    fn input(&self) -> &str {
        &self.input
    }

    fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    async fn execute_activity(
        &self,
        queue: &str,
        activity: &str,
        input: String,
        options: ActivityOptions,
    ) -> Result<String, OrchestrationError> {
        // Schedule-to-start: wait for a worker to register the handler.
        let deadline = tokio::time::Instant::now() + options.schedule_to_start;
        let handler = loop {
            if let Some(handler) = self.engine.registry.activity(queue, activity) {
                break handler;
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(OrchestrationError::timeout(
                    activity,
                    TimeoutType::ScheduleToStart,
                    queue,
                ));
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        };

        let sequence = self.engine.token_counter.fetch_add(1, Ordering::Relaxed);
        let token = format!("{}:{activity}:{sequence}", self.workflow_id).into_bytes();
        let key = BASE64.encode(&token);

        // Register the waiter before the handler runs so a completion
        // arriving immediately after ResultPending cannot be lost.
        let (tx, rx) = oneshot::channel();
        self.engine.pending.insert(key.clone(), tx);

        let context = ActivityContext::new(token.clone(), activity.to_string(), queue.to_string());
        let engine = Arc::clone(&self.engine);
        let pending_key = key.clone();
        let run = async move {
            match handler(context, input).await {
                Ok(ActivityOutcome::Completed(result)) => {
                    engine.pending.remove(&pending_key);
                    Ok(result)
                }
                Ok(ActivityOutcome::ResultPending) => {
                    debug!(
                        activity,
                        token = token_preview(&token),
                        "activity pending async completion"
                    );
                    rx.await.map_err(|_| OrchestrationError::Shutdown)?
                }
                Err(err) => {
                    engine.pending.remove(&pending_key);
                    Err(err)
                }
            }
        };

        match tokio::time::timeout(options.start_to_close, run).await {
            Ok(result) => result,
            Err(_) => {
                self.engine.pending.remove(&key);
                Err(OrchestrationError::timeout(
                    activity,
                    TimeoutType::StartToClose,
                    queue,
                ))
            }
        }
    }
}

#[async_trait]
impl WorkflowService for LocalEngine {
    async fn start_workflow(
        &self,
        options: StartWorkflowOptions,
        input: String,
    ) -> Result<WorkflowRun, OrchestrationError> {
        let handler = self
            .inner
            .registry
            .workflow(&options.task_queue, &options.workflow_name)
            .ok_or_else(|| OrchestrationError::UnknownWorkflow {
                name: options.workflow_name.clone(),
                queue: options.task_queue.clone(),
            })?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let (result_tx, result_rx) = watch::channel(None);

        match self.inner.runs.entry(options.workflow_id.clone()) {
            Entry::Occupied(_) => {
                return Err(OrchestrationError::WorkflowAlreadyStarted(
                    options.workflow_id,
                ));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(RunRecord {
                    run_id: run_id.clone(),
                    result: result_rx,
                });
            }
        }

        let context: Arc<dyn WorkflowContext> = Arc::new(LocalWorkflowContext {
            engine: Arc::clone(&self.inner),
            workflow_id: options.workflow_id.clone(),
            input,
        });
        let workflow_id = options.workflow_id.clone();
        let execution_timeout = options.execution_timeout;

        tokio::spawn(async move {
            let outcome =
                match tokio::time::timeout(execution_timeout, handler(context)).await {
                    Ok(Ok(result)) => Ok(result),
                    Ok(Err(err)) => Err(err.to_string()),
                    Err(_) => Err("workflow execution timeout".to_string()),
                };
            debug!(workflow_id, ok = outcome.is_ok(), "workflow finished");
            let _ = result_tx.send(Some(outcome));
        });

        Ok(WorkflowRun {
            workflow_id: options.workflow_id,
            run_id,
        })
    }

    async fn execute_workflow(
        &self,
        options: StartWorkflowOptions,
        input: String,
    ) -> Result<String, OrchestrationError> {
        let workflow_name = options.workflow_name.clone();
        let queue = options.task_queue.clone();
        let execution_timeout = options.execution_timeout;

        let run = self.start_workflow(options, input).await?;
        let mut result_rx = self
            .inner
            .runs
            .get(&run.workflow_id)
            .map(|record| record.result.clone())
            .ok_or(OrchestrationError::Shutdown)?;

        let wait = async {
            loop {
                let current = result_rx.borrow_and_update().clone();
                if let Some(outcome) = current {
                    return outcome;
                }
                if result_rx.changed().await.is_err() {
                    return Err("orchestration engine shut down".to_string());
                }
            }
        };

        match tokio::time::timeout(execution_timeout, wait).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(message)) => Err(OrchestrationError::Application {
                activity: format!("workflow:{workflow_name}"),
                message,
            }),
            Err(_) => Err(OrchestrationError::timeout(
                &workflow_name,
                TimeoutType::ScheduleToClose,
                &queue,
            )),
        }
    }
}

#[async_trait]
impl ActivityCompletionClient for LocalEngine {
    async fn complete(
        &self,
        task_token: &[u8],
        result: String,
    ) -> Result<(), OrchestrationError> {
        let key = BASE64.encode(task_token);
        match self.inner.pending.remove(&key) {
            Some((_, tx)) => {
                let _ = tx.send(Ok(result));
                Ok(())
            }
            None => Err(OrchestrationError::UnknownToken {
                preview: token_preview(task_token),
            }),
        }
    }

    async fn fail(&self, task_token: &[u8], error: String) -> Result<(), OrchestrationError> {
        let key = BASE64.encode(task_token);
        match self.inner.pending.remove(&key) {
            Some((_, tx)) => {
                let _ = tx.send(Err(OrchestrationError::Application {
                    activity: "external".to_string(),
                    message: error,
                }));
                Ok(())
            }
            None => Err(OrchestrationError::UnknownToken {
                preview: token_preview(task_token),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::ActivityHandler;
    use std::time::Duration;

    fn echo_activity() -> ActivityHandler {
        Arc::new(|_, input| Box::pin(async move { Ok(ActivityOutcome::Completed(input)) }))
    }

    fn options(id: &str) -> StartWorkflowOptions {
        StartWorkflowOptions {
            workflow_id: id.to_string(),
            workflow_name: "test-workflow".to_string(),
            task_queue: "test-queue".to_string(),
            execution_timeout: Duration::from_secs(5),
        }
    }

    fn engine_with_echo_workflow() -> LocalEngine {
        let registry = WorkerRegistry::new();
        registry.register_activity("test-queue", "Echo", echo_activity());
        registry.register_workflow(
            "test-queue",
            "test-workflow",
            Arc::new(|ctx| {
                Box::pin(async move {
                    ctx.execute_activity(
                        "test-queue",
                        "Echo",
                        ctx.input().to_string(),
                        ActivityOptions::short(),
                    )
                    .await
                })
            }),
        );
        LocalEngine::new(registry)
    }

    #[tokio::test]
    async fn execute_workflow_returns_result() {
        let engine = engine_with_echo_workflow();
        let result = engine
            .execute_workflow(options("wf-1"), "hello".to_string())
            .await
            .unwrap();
        assert_eq!(result, "hello");
    }

    #[tokio::test]
    async fn duplicate_workflow_id_rejected() {
        let engine = engine_with_echo_workflow();
        engine
            .start_workflow(options("wf-dup"), "x".to_string())
            .await
            .unwrap();
        let err = engine
            .start_workflow(options("wf-dup"), "x".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::WorkflowAlreadyStarted(_)));
    }

    #[tokio::test]
    async fn unknown_workflow_rejected() {
        let engine = LocalEngine::new(WorkerRegistry::new());
        let err = engine
            .start_workflow(options("wf-1"), "x".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::UnknownWorkflow { .. }));
    }

    #[tokio::test]
    async fn missing_runner_times_out_schedule_to_start() {
        let registry = WorkerRegistry::new();
        registry.register_workflow(
            "q",
            "wf",
            Arc::new(|ctx| {
                Box::pin(async move {
                    ctx.execute_activity(
                        "runner-queue",
                        "NeverRegistered",
                        String::new(),
                        ActivityOptions {
                            schedule_to_start: Duration::from_millis(100),
                            start_to_close: Duration::from_secs(5),
                        },
                    )
                    .await
                })
            }),
        );
        let engine = LocalEngine::new(registry);
        let err = engine
            .execute_workflow(
                StartWorkflowOptions {
                    workflow_id: "wf-t".to_string(),
                    workflow_name: "wf".to_string(),
                    task_queue: "q".to_string(),
                    execution_timeout: Duration::from_secs(60),
                },
                String::new(),
            )
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("SCHEDULE_TO_START"), "{message}");
        assert!(message.contains("runner-queue"), "{message}");
    }

    #[tokio::test]
    async fn result_pending_resumes_on_completion() {
        let registry = WorkerRegistry::new();
        let captured_token: Arc<std::sync::Mutex<Option<Vec<u8>>>> =
            Arc::new(std::sync::Mutex::new(None));
        let capture = Arc::clone(&captured_token);
        registry.register_activity(
            "q",
            "WaitForExternal",
            Arc::new(move |ctx, _| {
                let capture = Arc::clone(&capture);
                Box::pin(async move {
                    *capture.lock().unwrap() = Some(ctx.task_token().to_vec());
                    Ok(ActivityOutcome::ResultPending)
                })
            }),
        );
        registry.register_workflow(
            "q",
            "wf",
            Arc::new(|ctx| {
                Box::pin(async move {
                    ctx.execute_activity("q", "WaitForExternal", String::new(), ActivityOptions::short())
                        .await
                })
            }),
        );
        let engine = LocalEngine::new(registry);

        let completer = engine.clone();
        let waiter = tokio::spawn(async move {
            completer
                .execute_workflow(
                    StartWorkflowOptions {
                        workflow_id: "wf-pending".to_string(),
                        workflow_name: "wf".to_string(),
                        task_queue: "q".to_string(),
                        execution_timeout: Duration::from_secs(5),
                    },
                    String::new(),
                )
                .await
        });

        // Wait until the activity parked.
        let token = loop {
            if let Some(token) = captured_token.lock().unwrap().clone() {
                break token;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        };

        engine.complete(&token, "external-result".to_string()).await.unwrap();
        assert_eq!(waiter.await.unwrap().unwrap(), "external-result");

        // Completing twice is an unknown-token error.
        assert!(matches!(
            engine.complete(&token, "again".to_string()).await,
            Err(OrchestrationError::UnknownToken { .. })
        ));
    }

    #[tokio::test]
    async fn failed_completion_propagates_error() {
        let registry = WorkerRegistry::new();
        let captured: Arc<std::sync::Mutex<Option<Vec<u8>>>> =
            Arc::new(std::sync::Mutex::new(None));
        let capture = Arc::clone(&captured);
        registry.register_activity(
            "q",
            "Park",
            Arc::new(move |ctx, _| {
                let capture = Arc::clone(&capture);
                Box::pin(async move {
                    *capture.lock().unwrap() = Some(ctx.task_token().to_vec());
                    Ok(ActivityOutcome::ResultPending)
                })
            }),
        );
        registry.register_workflow(
            "q",
            "wf",
            Arc::new(|ctx| {
                Box::pin(async move {
                    ctx.execute_activity("q", "Park", String::new(), ActivityOptions::short())
                        .await
                })
            }),
        );
        let engine = LocalEngine::new(registry);

        let runner = engine.clone();
        let waiter = tokio::spawn(async move {
            runner
                .execute_workflow(
                    StartWorkflowOptions {
                        workflow_id: "wf-fail".to_string(),
                        workflow_name: "wf".to_string(),
                        task_queue: "q".to_string(),
                        execution_timeout: Duration::from_secs(5),
                    },
                    String::new(),
                )
                .await
        });

        let token = loop {
            if let Some(token) = captured.lock().unwrap().clone() {
                break token;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        };
        engine.fail(&token, "agent exploded".to_string()).await.unwrap();

        let err = waiter.await.unwrap().unwrap_err();
        assert!(err.to_string().contains("agent exploded"));
    }
}
