//! The external-activity completion system activity.
//!
//! Workflow code must stay deterministic, so the non-deterministic
//! `ActivityCompletionClient` call lives here, registered on both
//! execution orchestrator queues under its wire name.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::debug;

use crate::error::OrchestrationError;
use crate::port::{ActivityCompletionClient, ActivityOutcome, WorkerRegistry, token_preview};
use crate::wire::CompletionRequest;
use crate::{names, queues};

/// Registers `stigmer/system/complete-external-activity`.
pub struct SystemActivities {
    completion: Arc<dyn ActivityCompletionClient>,
}

impl SystemActivities {
    /// Create over the engine's completion client.
    #[must_use]
    pub fn new(completion: Arc<dyn ActivityCompletionClient>) -> Self {
        Self { completion }
    }

    /// Register on both execution orchestrator queues.
    pub fn register(self, registry: &WorkerRegistry) {
        let this = Arc::new(self);
        for queue in [queues::AGENT_EXECUTION_STIGMER, queues::WORKFLOW_EXECUTION_STIGMER] {
            let this = Arc::clone(&this);
            registry.register_activity(
                queue,
                names::COMPLETE_EXTERNAL_ACTIVITY,
                Arc::new(move |_, input| {
                    let this = Arc::clone(&this);
                    Box::pin(async move { this.complete_external(input).await })
                }),
            );
        }
    }

    async fn complete_external(
        &self,
        input: String,
    ) -> Result<ActivityOutcome, OrchestrationError> {
        let request: CompletionRequest = serde_json::from_str(&input)
            .map_err(|e| OrchestrationError::Payload(e.to_string()))?;
        let token = BASE64
            .decode(&request.token)
            .map_err(|e| OrchestrationError::Payload(format!("task token: {e}")))?;

        debug!(
            token = token_preview(&token),
            failing = request.error.is_some(),
            "completing external activity"
        );

        match request.error {
            Some(error) => self.completion.fail(&token, error).await?,
            None => {
                self.completion
                    .complete(&token, request.result.unwrap_or_default())
                    .await?;
            }
        }
        Ok(ActivityOutcome::Completed(String::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingCompletion {
        completed: Mutex<Vec<(Vec<u8>, String)>>,
        failed: Mutex<Vec<(Vec<u8>, String)>>,
    }

    #[async_trait]
    impl ActivityCompletionClient for RecordingCompletion {
        async fn complete(
            &self,
            task_token: &[u8],
            result: String,
        ) -> Result<(), OrchestrationError> {
            self.completed.lock().unwrap().push((task_token.to_vec(), result));
            Ok(())
        }

        async fn fail(&self, task_token: &[u8], error: String) -> Result<(), OrchestrationError> {
            self.failed.lock().unwrap().push((task_token.to_vec(), error));
            Ok(())
        }
    }

    #[tokio::test]
    async fn success_and_failure_paths_route_correctly() {
        let recorder = Arc::new(RecordingCompletion::default());
        let activities = SystemActivities::new(Arc::clone(&recorder) as _);

        let token = b"tok-123".to_vec();
        let success = CompletionRequest {
            token: BASE64.encode(&token),
            result: Some("done".to_string()),
            error: None,
        };
        activities
            .complete_external(serde_json::to_string(&success).unwrap())
            .await
            .unwrap();

        let failure = CompletionRequest {
            token: BASE64.encode(&token),
            result: None,
            error: Some("boom".to_string()),
        };
        activities
            .complete_external(serde_json::to_string(&failure).unwrap())
            .await
            .unwrap();

        assert_eq!(
            recorder.completed.lock().unwrap().as_slice(),
            &[(token.clone(), "done".to_string())]
        );
        assert_eq!(
            recorder.failed.lock().unwrap().as_slice(),
            &[(token, "boom".to_string())]
        );
    }

    #[tokio::test]
    async fn malformed_token_rejected() {
        let recorder = Arc::new(RecordingCompletion::default());
        let activities = SystemActivities::new(recorder as _);
        let request = CompletionRequest {
            token: "not-base64!!".to_string(),
            result: None,
            error: None,
        };
        let err = activities
            .complete_external(serde_json::to_string(&request).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::Payload(_)));
    }
}
