//! Stigmer Supervisor - crash detection and recovery for managed
//! subprocesses (the workflow-runner binary, the agent-runner container,
//! and optionally the embedded Temporal dev server).
//!
//! Kubernetes-style three-probe model, a 10-second watchdog loop,
//! exponential-backoff restarts, process-group discipline, and
//! flock-guarded idempotent starts.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod backoff;
mod error;
mod launcher;
mod probe;
mod supervisor;

pub use backoff::RestartPolicy;
pub use error::{SupervisorError, SupervisorResult};
pub use launcher::{Launcher, PidFilePayload, StartOutcome};
pub use probe::{Probe, ProbeOutcome, ProbeTarget};
pub use supervisor::{ComponentHealth, ComponentSpec, ComponentStatus, Supervisor};
