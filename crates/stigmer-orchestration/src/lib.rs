//! Stigmer Orchestration - the polyglot Temporal layer.
//!
//! Three domains (workflow validation, workflow execution, agent
//! execution), each with an orchestrator queue owned by this service and
//! a runner queue served by an external language-specific worker. The
//! Temporal SDK itself is consumed only through the ports in [`port`];
//! [`local::LocalEngine`] implements them in-process for the dev daemon
//! and for tests, and the workflow/activity wire names are carried
//! verbatim so a production Temporal adapter can be dropped in.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod activities;
pub mod config;
pub mod creators;
pub mod error;
pub mod local;
pub mod names;
pub mod port;
pub mod queues;
pub mod wire;
pub mod workflows;

pub use config::TemporalConfig;
pub use creators::{WorkflowCreator, WorkflowValidation};
pub use error::{OrchestrationError, TimeoutType};
pub use local::LocalEngine;
pub use port::{
    ActivityCompletionClient, ActivityContext, ActivityOptions, ActivityOutcome,
    StartWorkflowOptions, WorkerRegistry, WorkflowContext, WorkflowRun, WorkflowService,
};
