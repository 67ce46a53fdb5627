//! JSON payloads exchanged between workflows and activities.
//!
//! Workflow inputs and outputs are plain strings; structured payloads
//! use these serde types. Execution payloads carry the execution id and
//! the callback token only — never the merged environment.

use serde::{Deserialize, Serialize};

/// What the orchestrator workflow needs to know about an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionInfo {
    /// The execution's resource id.
    pub execution_id: String,
    /// Base64 of the caller activity's task token, when the execution was
    /// started by an external activity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_token: Option<String>,
}

/// Status write performed by the update-status activities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// The execution's resource id.
    pub execution_id: String,
    /// Target phase name (`RUNNING`, `COMPLETED`, `FAILED`, `CANCELLED`).
    pub phase: String,
    /// Terminal error message, when failing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Input of the external-activity completion system activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Base64-encoded task token of the paused caller activity.
    pub token: String,
    /// Successful result payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Error message; when set the caller activity fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of the workflow-definition validation runner activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether the definition parsed and validated.
    pub valid: bool,
    /// Engine error message when invalid.
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_info_omits_absent_token() {
        let info = ExecutionInfo {
            execution_id: "aex-1".to_string(),
            callback_token: None,
        };
        let json = serde_json::to_string(&info).unwrap();
        assert!(!json.contains("callback_token"));

        let parsed: ExecutionInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.execution_id, "aex-1");
        assert!(parsed.callback_token.is_none());
    }

    #[test]
    fn status_update_roundtrip() {
        let update = StatusUpdate {
            execution_id: "wex-1".to_string(),
            phase: "FAILED".to_string(),
            error: Some("boom".to_string()),
        };
        let parsed: StatusUpdate =
            serde_json::from_str(&serde_json::to_string(&update).unwrap()).unwrap();
        assert_eq!(parsed.phase, "FAILED");
        assert_eq!(parsed.error.as_deref(), Some("boom"));
    }
}
