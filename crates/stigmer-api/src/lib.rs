//! Stigmer API - Protobuf schema and gRPC bindings for `agentic.stigmer.ai/v1`.
//!
//! This crate provides:
//! - Generated message and service types for every resource kind
//! - The [`Resource`] trait family tying generated types to the kind registry
//! - The kind-stamp table consumed by the server's egress layer

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

/// Generated types for the `stigmer.v1` protobuf package.
#[allow(missing_docs, clippy::all, clippy::pedantic)]
pub mod v1 {
    tonic::include_proto!("stigmer.v1");
}

pub mod kind;
pub mod resource;
pub mod stamp;

pub use resource::{ExecutionResource, Resource, Stamp};

/// API group and version stamped on every outbound resource.
pub const API_VERSION: &str = "agentic.stigmer.ai/v1";
