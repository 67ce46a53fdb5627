//! Orchestration error types.
//!
//! Timeout classification is explicit: each of Temporal's four timeout
//! types carries a distinct, actionable message naming the likely
//! operator cause. Never classified by string matching.

/// The four Temporal activity timeout types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutType {
    /// The activity never got picked up by a worker.
    ScheduleToStart,
    /// The activity started but did not finish in time.
    StartToClose,
    /// The activity stopped heartbeating.
    Heartbeat,
    /// Scheduling plus execution exceeded the overall budget.
    ScheduleToClose,
}

impl TimeoutType {
    /// Operator-facing hint for this timeout on the given queue.
    #[must_use]
    pub fn operator_hint(self, queue: &str) -> String {
        match self {
            TimeoutType::ScheduleToStart => format!(
                "no worker available; check that the runner for queue {queue} is running"
            ),
            TimeoutType::StartToClose => format!(
                "the activity on queue {queue} started but exceeded its run deadline; \
                 inspect the runner's logs for a hang"
            ),
            TimeoutType::Heartbeat => format!(
                "the activity on queue {queue} stopped heartbeating; the runner likely \
                 crashed mid-activity"
            ),
            TimeoutType::ScheduleToClose => format!(
                "the activity on queue {queue} exhausted its overall schedule-to-close \
                 budget, including retries"
            ),
        }
    }
}

impl std::fmt::Display for TimeoutType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TimeoutType::ScheduleToStart => "SCHEDULE_TO_START",
            TimeoutType::StartToClose => "START_TO_CLOSE",
            TimeoutType::Heartbeat => "HEARTBEAT",
            TimeoutType::ScheduleToClose => "SCHEDULE_TO_CLOSE",
        };
        f.write_str(name)
    }
}

/// Errors from the orchestration layer.
#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    /// A workflow with this id already exists (`ReusePolicy = Reject`).
    #[error("workflow {0} already started")]
    WorkflowAlreadyStarted(String),

    /// No workflow under this name is registered on the queue.
    #[error("no workflow {name:?} registered on queue {queue:?}")]
    UnknownWorkflow {
        /// Requested workflow name.
        name: String,
        /// Task queue.
        queue: String,
    },

    /// An activity timed out.
    #[error("activity {activity:?} timed out ({timeout_type}): {hint}")]
    Timeout {
        /// Activity name.
        activity: String,
        /// Which of the four timeout types fired.
        timeout_type: TimeoutType,
        /// Operator guidance.
        hint: String,
    },

    /// An activity failed with an application error.
    #[error("activity {activity:?} failed: {message}")]
    Application {
        /// Activity name.
        activity: String,
        /// Error message from the activity.
        message: String,
    },

    /// The completion token does not correspond to a waiting activity.
    #[error("unknown task token {preview}")]
    UnknownToken {
        /// Truncated base64 preview of the token (never the full token).
        preview: String,
    },

    /// A payload could not be encoded or decoded.
    #[error("payload error: {0}")]
    Payload(String),

    /// The engine is shutting down.
    #[error("orchestration engine shut down")]
    Shutdown,
}

impl OrchestrationError {
    /// Build a timeout error with its operator hint.
    #[must_use]
    pub fn timeout(activity: &str, timeout_type: TimeoutType, queue: &str) -> Self {
        Self::Timeout {
            activity: activity.to_string(),
            timeout_type,
            hint: timeout_type.operator_hint(queue),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_to_start_names_the_queue() {
        let err = OrchestrationError::timeout(
            "RunAgent",
            TimeoutType::ScheduleToStart,
            "agent_execution_runner",
        );
        let message = err.to_string();
        assert!(message.contains("SCHEDULE_TO_START"));
        assert!(message.contains("agent_execution_runner"));
        assert!(message.contains("no worker available"));
    }

    #[test]
    fn timeout_types_have_distinct_hints() {
        let hints: std::collections::HashSet<String> = [
            TimeoutType::ScheduleToStart,
            TimeoutType::StartToClose,
            TimeoutType::Heartbeat,
            TimeoutType::ScheduleToClose,
        ]
        .into_iter()
        .map(|t| t.operator_hint("q"))
        .collect();
        assert_eq!(hints.len(), 4);
    }
}
