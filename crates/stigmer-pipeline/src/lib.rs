//! Stigmer Pipeline - composable request processing.
//!
//! Every controller method is an ordered list of [`Step`]s executed over a
//! shared [`RequestContext`]. Steps return [`PipelineError`]s that map 1:1
//! onto gRPC status codes at the controller boundary; the first error
//! aborts the pipeline and is returned unmodified.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod context;
mod error;
mod pipeline;
pub mod ports;
pub mod steps;

pub use context::RequestContext;
pub use error::PipelineError;
pub use pipeline::{FnStep, Pipeline, Step};
pub use ports::{ExecutionStarter, WorkflowSpecValidator};
