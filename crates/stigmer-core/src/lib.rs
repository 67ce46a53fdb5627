//! Stigmer Core - Foundation types for the control plane.
//!
//! This crate provides:
//! - Kind-prefixed monotonic id generation
//! - Slug derivation from resource names
//! - The execution phase machine
//! - Metadata stamping for create/update pipelines
//! - The error-kind taxonomy mapped onto gRPC status codes
//! - Request validation

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod clock;
pub mod error;
pub mod id;
pub mod meta;
pub mod phase;
pub mod slug;
pub mod validate;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::ErrorKind;
pub use id::IdGenerator;
pub use slug::slugify;
pub use validate::{Validate, ValidationError};
