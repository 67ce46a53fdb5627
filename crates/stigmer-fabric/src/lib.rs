//! Stigmer Fabric - the in-process gRPC loopback and the server stack.
//!
//! One logical gRPC server serves two listeners through the same layer
//! chain: the TCP listener for external callers and an in-memory duplex
//! listener the daemon's own downstream clients dial. A cross-domain
//! call is therefore indistinguishable from an external one — same
//! validation, same interceptors, exactly one authoritative path per
//! write.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod logging;
mod loopback;
pub mod stack;
mod stamp;

pub use logging::RequestLogLayer;
pub use loopback::{Loopback, LoopbackIncoming};
pub use stack::{Controllers, DownstreamClients};
pub use stamp::KindStampLayer;
