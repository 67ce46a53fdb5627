//! Reference shapes used by cross-kind lookups.
//!
//! A spec-level reference field (`agent_ref`, `environment_refs[i]`)
//! holds either a resource id (kind-prefixed) or a slug resolved within
//! the caller's org.

use stigmer_api::v1::{ApiResourceKind, ApiResourceReference, SlugReference, api_resource_reference};

pub(crate) fn reference_for(kind: ApiResourceKind, org: &str, reference: &str) -> ApiResourceReference {
    let prefix = format!("{}-", kind.id_prefix());
    let handle = if reference.starts_with(&prefix) {
        api_resource_reference::Handle::Id(reference.to_string())
    } else {
        api_resource_reference::Handle::SlugRef(SlugReference {
            org: org.to_string(),
            slug: reference.to_string(),
        })
    };
    ApiResourceReference {
        handle: Some(handle),
    }
}

/// A reference that fails to resolve is a precondition failure of the
/// referring request, not a plain NotFound.
pub(crate) fn resolve_failure(
    status: tonic::Status,
    kind: ApiResourceKind,
    reference: &str,
) -> stigmer_pipeline::PipelineError {
    match status.code() {
        tonic::Code::NotFound => stigmer_pipeline::PipelineError::failed_precondition(format!(
            "referenced {kind} {reference:?} does not exist"
        )),
        _ => status.into(),
    }
}
