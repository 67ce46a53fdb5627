//! Stigmer Telemetry - logging setup for the control plane.
//!
//! Thin configuration layer over the tracing ecosystem: an env-filter
//! seeded from `LOG_LEVEL`, pretty/compact/json formats, and an optional
//! daily-rolling file target under the log directory.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod logging;

pub use logging::{LogConfig, LogFormat, LogTarget, setup_logging};

/// Errors from logging initialization.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The filter or a directive failed to parse.
    #[error("invalid logging configuration: {0}")]
    Config(String),

    /// A global subscriber was already installed.
    #[error("logging already initialized: {0}")]
    Init(String),
}

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
