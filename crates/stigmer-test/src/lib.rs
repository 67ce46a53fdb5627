//! Test harness for the control plane.
//!
//! [`TestStack`] brings up the full in-process stack: controllers over a
//! memory store, the loopback server with the real layer chain, the
//! local orchestration engine with the control-plane workers, and typed
//! clients. Runner queues are left to the test: register fakes with
//! [`TestStack::register_runner_activity`].

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod fixtures;
mod stack;

pub use fixtures::{agent, agent_execution, environment_with, workflow_with_set_task};
pub use stack::TestStack;
