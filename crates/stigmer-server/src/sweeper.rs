//! ExecutionContext TTL sweeper.
//!
//! Contexts are deleted by the status pipelines on terminal phases; this
//! periodic sweep is the backstop for executions that never get there.
//! Deletes go through the loopback client so the ExecutionContext
//! controller stays the only writer of its prefix.

use std::sync::Arc;

use prost::Message;
use stigmer_api::v1::execution_context_command_controller_client::ExecutionContextCommandControllerClient;
use stigmer_api::v1::{ApiResourceId, ExecutionContext};
use stigmer_store::KvStore;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Sweep interval.
const SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(10 * 60);

pub(crate) fn spawn(
    kv: Arc<dyn KvStore>,
    channel: tonic::transport::Channel,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut client = ExecutionContextCommandControllerClient::new(channel);
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown_rx.recv() => return,
            }
            sweep(kv.as_ref(), &mut client).await;
        }
    })
}

async fn sweep(
    kv: &dyn KvStore,
    client: &mut ExecutionContextCommandControllerClient<tonic::transport::Channel>,
) {
    let entries = match kv.scan_prefix("execution_context/").await {
        Ok(entries) => entries,
        Err(err) => {
            warn!(error = %err, "context sweep scan failed");
            return;
        }
    };
    let now = chrono::Utc::now();

    for (key, bytes) in entries {
        let Ok(context) = ExecutionContext::decode(bytes.as_slice()) else {
            continue;
        };
        let Some(expires_at) = context
            .status
            .as_ref()
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s.expires_at).ok())
        else {
            continue;
        };
        if expires_at.with_timezone(&chrono::Utc) > now {
            continue;
        }

        let execution_id = context
            .spec
            .as_ref()
            .map_or(String::new(), |s| s.execution_id.clone());
        match client
            .delete(ApiResourceId {
                value: execution_id.clone(),
            })
            .await
        {
            Ok(_) => debug!(key, execution = execution_id, "expired context swept"),
            Err(status) => {
                warn!(key, error = %status, "sweeping expired context failed");
            }
        }
    }
}
