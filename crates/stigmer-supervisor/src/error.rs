//! Supervisor error types.

/// Errors from process supervision.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// Spawning the child failed.
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        /// Command name.
        command: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Lock, pid, or log file I/O failed.
    #[error("state file {path}: {source}")]
    StateFile {
        /// File path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The component lock is held by another process that could not be
    /// identified.
    #[error("lock for {component} is held but its pid file is unreadable")]
    ForeignLock {
        /// Component name.
        component: String,
    },

    /// Signalling the process group failed.
    #[error("failed to signal process group {pgid}: {source}")]
    Signal {
        /// Process group id.
        pgid: i32,
        /// Underlying errno.
        #[source]
        source: nix::errno::Errno,
    },

    /// The component exhausted its restart budget.
    #[error("{component} exceeded {max_restarts} restarts within the window; giving up")]
    GivenUp {
        /// Component name.
        component: String,
        /// The restart budget.
        max_restarts: usize,
    },

    /// The component is not registered.
    #[error("unknown component {0}")]
    UnknownComponent(String),
}

/// Result type for supervision operations.
pub type SupervisorResult<T> = Result<T, SupervisorError>;
