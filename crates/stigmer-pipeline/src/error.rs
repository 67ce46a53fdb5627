//! Structured pipeline errors.

use stigmer_core::ErrorKind;
use stigmer_core::validate::ValidationError;
use stigmer_store::StoreError;

/// Error returned by a failed pipeline step.
///
/// Steps never log; the controller boundary logs and converts the error
/// into a `tonic::Status` via [`PipelineError::into_status`].
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct PipelineError {
    /// Classification driving the gRPC status code.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
    /// Underlying cause, when any.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// True when the caller may retry the request unchanged.
    pub retryable: bool,
}

impl PipelineError {
    /// Create an error of the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
            retryable: matches!(kind, ErrorKind::Unavailable | ErrorKind::Conflict),
        }
    }

    /// Attach an underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Override the retryable flag.
    #[must_use]
    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// `INVALID_ARGUMENT`.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    /// `ALREADY_EXISTS`.
    #[must_use]
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, message)
    }

    /// `NOT_FOUND`.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// `ABORTED` (version conflict).
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// `FAILED_PRECONDITION`.
    #[must_use]
    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FailedPrecondition, message)
    }

    /// `INTERNAL`.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// `UNAVAILABLE`.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    /// Convert into the gRPC status surfaced to the caller.
    #[must_use]
    pub fn into_status(self) -> tonic::Status {
        tonic::Status::new(self.kind.code(), self.message)
    }
}

impl From<ValidationError> for PipelineError {
    fn from(err: ValidationError) -> Self {
        Self::new(ErrorKind::InvalidArgument, err.to_string()).with_source(err)
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        let kind = match &err {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::Conflict(_) => ErrorKind::Conflict,
            _ => ErrorKind::Internal,
        };
        Self::new(kind, err.to_string()).with_source(err)
    }
}

/// Downstream in-process calls surface `tonic::Status`; map it back onto
/// the kind taxonomy so cross-domain failures keep their class.
impl From<tonic::Status> for PipelineError {
    fn from(status: tonic::Status) -> Self {
        let kind = match status.code() {
            tonic::Code::InvalidArgument => ErrorKind::InvalidArgument,
            tonic::Code::AlreadyExists => ErrorKind::AlreadyExists,
            tonic::Code::NotFound => ErrorKind::NotFound,
            tonic::Code::Aborted => ErrorKind::Conflict,
            tonic::Code::FailedPrecondition => ErrorKind::FailedPrecondition,
            tonic::Code::Cancelled => ErrorKind::Cancelled,
            tonic::Code::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            tonic::Code::Unavailable => ErrorKind::Unavailable,
            _ => ErrorKind::Internal,
        };
        Self::new(kind, status.message().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let status = PipelineError::not_found("agent agt-1 not found").into_status();
        assert_eq!(status.code(), tonic::Code::NotFound);
        assert_eq!(status.message(), "agent agt-1 not found");
    }

    #[test]
    fn store_conflict_is_retryable() {
        let err: PipelineError = StoreError::Conflict("agent/agt-1".to_string()).into();
        assert_eq!(err.kind, ErrorKind::Conflict);
        assert!(err.retryable);
    }

    #[test]
    fn status_roundtrip_preserves_kind() {
        let original = PipelineError::failed_precondition("env env-prod missing");
        let status = original.into_status();
        let back: PipelineError = status.into();
        assert_eq!(back.kind, ErrorKind::FailedPrecondition);
    }
}
