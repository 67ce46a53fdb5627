//! Error-kind taxonomy mapped onto gRPC status codes at the controller
//! boundary.

use tonic::Code;

/// Classification of a failed pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Request validation failed or an id was malformed.
    InvalidArgument,
    /// Slug collision on create.
    AlreadyExists,
    /// Resource or reference target missing.
    NotFound,
    /// Optimistic-concurrency version check failed.
    Conflict,
    /// Referenced resource missing or in the wrong state.
    FailedPrecondition,
    /// Store or serialization failure.
    Internal,
    /// Temporal unreachable where mandatory, or a downstream call died.
    Unavailable,
    /// Request context was cancelled.
    Cancelled,
    /// A step exceeded its timeout.
    DeadlineExceeded,
}

impl ErrorKind {
    /// The gRPC status code this kind maps to.
    #[must_use]
    pub fn code(self) -> Code {
        match self {
            ErrorKind::InvalidArgument => Code::InvalidArgument,
            ErrorKind::AlreadyExists => Code::AlreadyExists,
            ErrorKind::NotFound => Code::NotFound,
            ErrorKind::Conflict => Code::Aborted,
            ErrorKind::FailedPrecondition => Code::FailedPrecondition,
            ErrorKind::Internal => Code::Internal,
            ErrorKind::Unavailable => Code::Unavailable,
            ErrorKind::Cancelled => Code::Cancelled,
            ErrorKind::DeadlineExceeded => Code::DeadlineExceeded,
        }
    }

    /// True for the caller-fault class logged at WARN rather than ERROR.
    #[must_use]
    pub fn is_client_error(self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidArgument
                | ErrorKind::AlreadyExists
                | ErrorKind::NotFound
                | ErrorKind::Conflict
                | ErrorKind::FailedPrecondition
                | ErrorKind::Cancelled
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::NotFound => "not found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::FailedPrecondition => "failed precondition",
            ErrorKind::Internal => "internal",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::DeadlineExceeded => "deadline exceeded",
        };
        f.write_str(name)
    }
}
