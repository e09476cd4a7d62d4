use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use crate::context::IterationContext;

/// The body executed once per iteration by every virtual user.
///
/// Returning an error or panicking marks the iteration failed. It is counted and logged; the
/// VU moves on to its next iteration.
pub trait Scenario: Send + Sync + 'static {
    type Error: Display + Send + 'static;

    fn run(&self, ctx: &IterationContext) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

impl<S: Scenario> Scenario for Arc<S> {
    type Error = S::Error;

    fn run(&self, ctx: &IterationContext) -> impl Future<Output = Result<(), Self::Error>> + Send {
        (**self).run(ctx)
    }
}

/// Adapts an async closure taking an owned context.
#[derive(Debug, Clone)]
pub struct ScenarioFn<F>(F);

pub fn scenario_fn<F, Fut, E>(f: F) -> ScenarioFn<F>
where
    F: Fn(IterationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    ScenarioFn(f)
}

impl<F, Fut, E> Scenario for ScenarioFn<F>
where
    F: Fn(IterationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    type Error = E;

    fn run(&self, ctx: &IterationContext) -> impl Future<Output = Result<(), E>> + Send {
        (self.0)(ctx.clone())
    }
}
