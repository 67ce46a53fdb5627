//! Stigmer Controllers - one domain controller per resource kind.
//!
//! Controllers are thin orchestrators: they assemble pipelines from the
//! standard step library plus their kind-specific steps, execute them
//! over a [`stigmer_pipeline::RequestContext`], and map the result at the
//! gRPC boundary. Cross-kind reads and writes go through downstream
//! clients dialled against the in-process loopback, so every internal
//! call takes the same validated path as an external one.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod agent;
mod agent_execution;
mod agent_instance;
mod base;
mod boundary;
mod downstream;
mod environment;
pub mod envmerge;
mod execution_context;
mod refs;
mod session;
mod skill;
mod workflow;
mod workflow_execution;
mod workflow_instance;

pub use agent::AgentController;
pub use agent_execution::AgentExecutionController;
pub use agent_instance::AgentInstanceController;
pub use base::{Base, ControllerDeps};
pub use downstream::Downstream;
pub use environment::EnvironmentController;
pub use execution_context::ExecutionContextController;
pub use session::SessionController;
pub use skill::SkillController;
pub use workflow::WorkflowController;
pub use workflow_execution::WorkflowExecutionController;
pub use workflow_instance::WorkflowInstanceController;
