//! Agent-execution control-plane activities.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use stigmer_api::ExecutionResource;
use stigmer_api::v1::agent_execution_command_controller_client::AgentExecutionCommandControllerClient;
use stigmer_api::v1::agent_execution_query_controller_client::AgentExecutionQueryControllerClient;
use stigmer_api::v1::{AgentExecutionStatus, ApiResourceId, UpdateAgentExecutionStatusRequest};
use tonic::transport::Channel;

use super::{phase_from_name, status_error};
use crate::error::OrchestrationError;
use crate::port::{ActivityOutcome, WorkerRegistry};
use crate::wire::{ExecutionInfo, StatusUpdate};
use crate::{names, queues};

/// Fetch and status-write activities for the agent-execution domain,
/// registered on `agent_execution_stigmer`.
pub struct AgentExecutionActivities {
    query: AgentExecutionQueryControllerClient<Channel>,
    command: AgentExecutionCommandControllerClient<Channel>,
}

impl AgentExecutionActivities {
    /// Create over the loopback channel.
    #[must_use]
    pub fn new(channel: Channel) -> Self {
        Self {
            query: AgentExecutionQueryControllerClient::new(channel.clone()),
            command: AgentExecutionCommandControllerClient::new(channel),
        }
    }

    /// Register both activities.
    pub fn register(self, registry: &WorkerRegistry) {
        let this = Arc::new(self);

        let get = Arc::clone(&this);
        registry.register_activity(
            queues::AGENT_EXECUTION_STIGMER,
            names::GET_AGENT_EXECUTION,
            Arc::new(move |_, input| {
                let this = Arc::clone(&get);
                Box::pin(async move { this.get_execution(input).await })
            }),
        );

        registry.register_activity(
            queues::AGENT_EXECUTION_STIGMER,
            names::UPDATE_AGENT_EXECUTION_STATUS,
            Arc::new(move |_, input| {
                let this = Arc::clone(&this);
                Box::pin(async move { this.update_status(input).await })
            }),
        );
    }

    async fn get_execution(
        &self,
        execution_id: String,
    ) -> Result<ActivityOutcome, OrchestrationError> {
        let response = self
            .query
            .clone()
            .get(ApiResourceId {
                value: execution_id.clone(),
            })
            .await
            .map_err(|s| status_error(names::GET_AGENT_EXECUTION, &s))?;
        let execution = response.into_inner();

        let token = execution.callback_token();
        let info = ExecutionInfo {
            execution_id,
            callback_token: if token.is_empty() {
                None
            } else {
                Some(BASE64.encode(token))
            },
        };
        let payload = serde_json::to_string(&info)
            .map_err(|e| OrchestrationError::Payload(e.to_string()))?;
        Ok(ActivityOutcome::Completed(payload))
    }

    async fn update_status(&self, input: String) -> Result<ActivityOutcome, OrchestrationError> {
        let update: StatusUpdate = serde_json::from_str(&input)
            .map_err(|e| OrchestrationError::Payload(e.to_string()))?;
        let phase = phase_from_name(&update.phase)?;

        let status = AgentExecutionStatus {
            phase: phase.into(),
            error: update.error.unwrap_or_default(),
            ..Default::default()
        };
        self.command
            .clone()
            .update_status(UpdateAgentExecutionStatusRequest {
                execution_id: update.execution_id,
                status: Some(status),
            })
            .await
            .map_err(|s| status_error(names::UPDATE_AGENT_EXECUTION_STATUS, &s))?;
        Ok(ActivityOutcome::Completed(String::new()))
    }
}
