use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures::FutureExt as _;

use crate::context::IterationContext;
use crate::iteration_metrics::IterationMetrics;
use crate::scenario::Scenario;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    Succeeded,
    Failed(String),
}

impl IterationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Executes a scenario one iteration at a time and records the built-in iteration metrics.
#[derive(Debug)]
pub struct ScenarioRunner<S> {
    scenario: S,
    metrics: IterationMetrics,
}

impl<S: Scenario> ScenarioRunner<S> {
    pub fn new(scenario: S, metrics: IterationMetrics) -> Self {
        Self { scenario, metrics }
    }

    pub fn scenario(&self) -> &S {
        &self.scenario
    }

    /// Runs one iteration. Scenario errors and panics are recorded and logged, never returned.
    pub async fn run_once(&self, ctx: &IterationContext) -> IterationOutcome {
        let started = Instant::now();
        let result = AssertUnwindSafe(self.scenario.run(ctx))
            .catch_unwind()
            .await
            .map_err(|payload| format!("panicked: {}", panic_message(payload.as_ref())))
            .and_then(|res| res.map_err(|err| err.to_string()));
        let elapsed = started.elapsed();

        match result {
            Ok(()) => {
                self.metrics.record(elapsed, true);
                IterationOutcome::Succeeded
            }
            Err(msg) => {
                self.metrics.record(elapsed, false);
                log::warn!(
                    "iteration failed (vu {}, iteration {}, global {}): {msg}",
                    ctx.vu_id(),
                    ctx.iteration(),
                    ctx.global_iteration()
                );
                IterationOutcome::Failed(msg)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::CheckRecorder;
    use crate::iteration_metrics::{ITERATION_DURATION, ITERATION_ERRORS, ITERATIONS};
    use crate::scenario::scenario_fn;
    use std::sync::Arc;
    use swarmr_metrics::Registry;

    #[tokio::test]
    async fn errors_are_counted_not_propagated() {
        let registry = Arc::new(Registry::default());
        let metrics = IterationMetrics::register(&registry).unwrap_or_else(|e| panic!("{e}"));
        let checks = CheckRecorder::new(registry.rate("checks").unwrap_or_else(|e| panic!("{e}")));

        let runner = ScenarioRunner::new(
            scenario_fn(|ctx: IterationContext| async move {
                if ctx.iteration() % 2 == 1 {
                    return Err(format!("odd iteration {}", ctx.iteration()));
                }
                Ok(())
            }),
            metrics,
        );

        let mut failed = 0;
        for i in 0..6 {
            let ctx =
                IterationContext::new(1, i, i, None, i, checks.clone(), registry.clone());
            if let IterationOutcome::Failed(msg) = runner.run_once(&ctx).await {
                assert!(msg.starts_with("odd iteration"));
                failed += 1;
            }
        }
        assert_eq!(failed, 3);

        let snap = registry.snapshot();
        assert_eq!(snap.counter_total(ITERATIONS), 6);
        assert_eq!(snap.counter_total(ITERATION_ERRORS), 3);
        assert_eq!(snap.get(ITERATION_DURATION).map(|m| m.count()), Some(6));
    }

    #[tokio::test]
    async fn panics_count_as_failed_iterations() {
        let registry = Arc::new(Registry::default());
        let metrics = IterationMetrics::register(&registry).unwrap_or_else(|e| panic!("{e}"));
        let checks = CheckRecorder::new(registry.rate("checks").unwrap_or_else(|e| panic!("{e}")));

        let runner = ScenarioRunner::new(
            scenario_fn(|ctx: IterationContext| async move {
                if ctx.iteration() == 1 {
                    panic!("record {} is missing", ctx.iteration());
                }
                Ok::<(), String>(())
            }),
            metrics,
        );

        let mut outcomes = Vec::new();
        for i in 0..3 {
            let ctx =
                IterationContext::new(1, i, i, None, i, checks.clone(), registry.clone());
            outcomes.push(runner.run_once(&ctx).await);
        }

        assert!(outcomes[0].is_success());
        assert_eq!(
            outcomes[1],
            IterationOutcome::Failed("panicked: record 1 is missing".to_string())
        );
        assert!(outcomes[2].is_success());

        let snap = registry.snapshot();
        assert_eq!(snap.counter_total(ITERATIONS), 3);
        assert_eq!(snap.counter_total(ITERATION_ERRORS), 1);
    }
}
