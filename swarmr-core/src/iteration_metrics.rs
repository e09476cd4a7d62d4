use std::time::Duration;

use swarmr_metrics::{Counter, Registry, Trend};

use crate::error::Result;

pub const ITERATIONS: &str = "iterations";
/// Milliseconds.
pub const ITERATION_DURATION: &str = "iteration_duration";
pub const ITERATION_ERRORS: &str = "iteration_errors";
pub const CHECKS: &str = "checks";

/// Handles to the built-in per-iteration metrics.
#[derive(Debug, Clone)]
pub struct IterationMetrics {
    iterations: Counter,
    duration: Trend,
    errors: Counter,
}

impl IterationMetrics {
    pub fn register(metrics: &Registry) -> Result<Self> {
        Ok(Self {
            iterations: metrics.counter(ITERATIONS)?,
            duration: metrics.trend(ITERATION_DURATION)?,
            errors: metrics.counter(ITERATION_ERRORS)?,
        })
    }

    pub fn record(&self, duration: Duration, success: bool) {
        self.iterations.increment();
        self.duration.add_duration_ms(duration);
        if !success {
            self.errors.increment();
        }
    }

    pub fn iterations(&self) -> u64 {
        self.iterations.value()
    }

    pub fn errors(&self) -> u64 {
        self.errors.value()
    }
}
