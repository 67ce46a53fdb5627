//! Stigmer Server - daemon wiring and lifecycle.
//!
//! Bring-up order is mandatory: config → store → controllers (without
//! downstream clients) → loopback serve → dial → inject clients →
//! orchestration workers → TCP listener → supervisor. Shutdown runs in
//! reverse.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod daemon;
mod sweeper;

pub use daemon::{Daemon, DaemonError};
