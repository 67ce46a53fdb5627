//! Configuration error types.

/// Errors from configuration loading. All of these are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable held an unparseable value.
    #[error("invalid value for {var}: {message}")]
    InvalidValue {
        /// Variable name.
        var: String,
        /// What went wrong.
        message: String,
    },

    /// The home directory could not be resolved.
    #[error("cannot resolve home directory: {0}")]
    NoHome(String),

    /// Directory scaffolding failed.
    #[error("cannot create directory {path}: {source}")]
    Scaffolding {
        /// Directory path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;
