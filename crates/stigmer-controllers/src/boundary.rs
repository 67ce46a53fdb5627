//! The controller/gRPC boundary: result mapping and logging.
//!
//! Steps never log; this is the single place pipeline failures are
//! logged (WARN for caller faults, ERROR for server faults) and turned
//! into `tonic::Status`.

use stigmer_api::v1::ApiResourceKind;
use stigmer_pipeline::PipelineError;
use tracing::{error, warn};

pub(crate) fn respond<T>(
    result: Result<T, PipelineError>,
    kind: ApiResourceKind,
    operation: &str,
) -> Result<tonic::Response<T>, tonic::Status> {
    match result {
        Ok(message) => Ok(tonic::Response::new(message)),
        Err(err) => {
            if err.kind.is_client_error() {
                warn!(kind = %kind, operation, error = %err, "request rejected");
            } else {
                error!(kind = %kind, operation, error = %err, "request failed");
            }
            Err(err.into_status())
        }
    }
}
