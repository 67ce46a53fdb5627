//! Step trait and ordered executor.

use async_trait::async_trait;
use tracing::Instrument;

use crate::context::RequestContext;
use crate::error::PipelineError;

/// One operation in a pipeline.
#[async_trait]
pub trait Step<Req, R>: Send + Sync {
    /// Step name used for the per-step tracing span.
    fn name(&self) -> &'static str;

    /// Run the step over the shared context.
    async fn execute(&self, ctx: &mut RequestContext<Req, R>) -> Result<(), PipelineError>;
}

/// Ordered, short-circuiting composition of steps.
pub struct Pipeline<Req, R> {
    steps: Vec<Box<dyn Step<Req, R>>>,
}

impl<Req, R> Default for Pipeline<Req, R> {
    fn default() -> Self {
        Self { steps: Vec::new() }
    }
}

impl<Req: Send, R: Send> Pipeline<Req, R> {
    /// Create an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step.
    #[must_use]
    pub fn add_step(mut self, step: impl Step<Req, R> + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Execute all steps in order. The first error aborts the run and is
    /// returned unmodified.
    pub async fn execute(&self, ctx: &mut RequestContext<Req, R>) -> Result<(), PipelineError> {
        for step in &self.steps {
            let span = tracing::debug_span!("step", name = step.name());
            step.execute(ctx).instrument(span).await?;
        }
        Ok(())
    }
}

/// Step over a synchronous context transform; used for small
/// kind-specific merges that need no I/O.
pub struct FnStep<F> {
    name: &'static str,
    f: F,
}

impl<F> FnStep<F> {
    /// Wrap a closure as a named step.
    pub fn new(name: &'static str, f: F) -> Self {
        Self { name, f }
    }
}

#[async_trait]
impl<Req, R, F> Step<Req, R> for FnStep<F>
where
    Req: Send,
    R: Send,
    F: Fn(&mut RequestContext<Req, R>) -> Result<(), PipelineError> + Send + Sync,
{
    fn name(&self) -> &'static str {
        self.name
    }

    async fn execute(&self, ctx: &mut RequestContext<Req, R>) -> Result<(), PipelineError> {
        (self.f)(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn executes_in_order() {
        type Ctx = RequestContext<(), ()>;
        let pipeline: Pipeline<(), ()> = Pipeline::new()
            .add_step(FnStep::<fn(&mut Ctx) -> Result<(), PipelineError>>::new(
                "first",
                |ctx| {
                    ctx.put("trace", vec!["first".to_string()]);
                    Ok(())
                },
            ))
            .add_step(FnStep::<fn(&mut Ctx) -> Result<(), PipelineError>>::new(
                "second",
                |ctx| {
                    let mut trace = ctx.take::<Vec<String>>("trace").unwrap_or_default();
                    trace.push("second".to_string());
                    ctx.put("trace", trace);
                    Ok(())
                },
            ));

        let mut ctx = RequestContext::new(());
        pipeline.execute(&mut ctx).await.unwrap();
        assert_eq!(
            ctx.get::<Vec<String>>("trace").unwrap(),
            &vec!["first".to_string(), "second".to_string()]
        );
    }

    #[tokio::test]
    async fn short_circuits_on_first_error() {
        type Ctx = RequestContext<(), ()>;
        let pipeline: Pipeline<(), ()> = Pipeline::new()
            .add_step(FnStep::<fn(&mut Ctx) -> Result<(), PipelineError>>::new(
                "boom",
                |_| Err(PipelineError::invalid_argument("bad request")),
            ))
            .add_step(FnStep::<fn(&mut Ctx) -> Result<(), PipelineError>>::new(
                "unreachable",
                |ctx| {
                    ctx.put("ran", true);
                    Ok(())
                },
            ));

        let mut ctx = RequestContext::new(());
        let err = pipeline.execute(&mut ctx).await.unwrap_err();
        assert_eq!(err.kind, stigmer_core::ErrorKind::InvalidArgument);
        assert_eq!(ctx.get::<bool>("ran"), None);
    }
}
