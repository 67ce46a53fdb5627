//! Request validation step.

use std::marker::PhantomData;

use async_trait::async_trait;
use stigmer_core::Validate;

use crate::{PipelineError, RequestContext, Step};

/// Runs the request's validation rules; fails with `INVALID_ARGUMENT`.
pub struct ValidateRequest<Req> {
    _marker: PhantomData<fn() -> Req>,
}

impl<Req> ValidateRequest<Req> {
    /// Create the step.
    #[must_use]
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<Req> Default for ValidateRequest<Req> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<Req, R> Step<Req, R> for ValidateRequest<Req>
where
    Req: Validate + Send + Sync,
    R: Send,
{
    fn name(&self) -> &'static str {
        "validate_request"
    }

    async fn execute(&self, ctx: &mut RequestContext<Req, R>) -> Result<(), PipelineError> {
        ctx.request().validate().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stigmer_api::v1::{Agent, ApiResourceId};
    use stigmer_core::ErrorKind;

    #[tokio::test]
    async fn invalid_request_maps_to_invalid_argument() {
        let step: ValidateRequest<Agent> = ValidateRequest::new();
        let mut ctx: RequestContext<Agent, Agent> = RequestContext::new(Agent::default());
        let err = step.execute(&mut ctx).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn valid_id_passes() {
        let step: ValidateRequest<ApiResourceId> = ValidateRequest::new();
        let mut ctx: RequestContext<ApiResourceId, Agent> = RequestContext::new(ApiResourceId {
            value: "agt-01J8".to_string(),
        });
        step.execute(&mut ctx).await.unwrap();
    }
}
