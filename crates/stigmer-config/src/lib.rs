//! Stigmer Config - process configuration for the control plane.
//!
//! Configuration comes exclusively from environment variables with
//! sensible defaults; there is no config file. [`Config::from_env`] reads
//! the documented `STIGMER_*` / `TEMPORAL_*` / `LOG_LEVEL` variables, and
//! [`StigmerHome`] scaffolds the data and log directories.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod config;
mod error;
mod home;

pub use config::{Config, SupervisorOverrides, TemporalSettings};
pub use error::{ConfigError, ConfigResult};
pub use home::{ComponentPaths, StigmerHome};
