//! Temporal connection configuration.

use std::time::Duration;

/// Settings for the Temporal frontend connection.
#[derive(Debug, Clone)]
pub struct TemporalConfig {
    /// Frontend address, host:port.
    pub address: String,
    /// Namespace all workflows run in.
    pub namespace: String,
    /// Default execution timeout for run workflows.
    pub execution_timeout: Duration,
    /// Execution timeout when the execution carries a callback token and
    /// the caller activity waits asynchronously.
    pub async_execution_timeout: Duration,
    /// Timeout for the synchronous validation workflow.
    pub validation_timeout: Duration,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            address: "localhost:7233".to_string(),
            namespace: "default".to_string(),
            execution_timeout: Duration::from_secs(30 * 60),
            async_execution_timeout: Duration::from_secs(24 * 60 * 60),
            validation_timeout: Duration::from_secs(30),
        }
    }
}
