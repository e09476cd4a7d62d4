use std::time::Duration;

use swarmr_metrics::MetricsSnapshot;

use crate::iteration_metrics::{CHECKS, ITERATION_DURATION, ITERATION_ERRORS, ITERATIONS};

#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Monotonic tick counter (1-based) for progress emissions.
    pub tick: u64,
    pub elapsed: Duration,
    pub interval: Duration,
    /// Run deadline, when the run is duration-bounded.
    pub duration: Option<Duration>,
    pub vus_total: u64,
    pub vus_running: u64,
    pub iterations_total: u64,
    pub iteration_errors: u64,
    pub checks_passes: u64,
    pub checks_total: u64,
    pub iteration_duration_avg_ms: f64,
    pub iteration_duration_p95_ms: f64,
    /// Iterations/sec observed during the last progress interval.
    pub iterations_per_sec_now: f64,
    /// Full metric view at this tick, custom metrics included.
    pub metrics: MetricsSnapshot,
}

impl ProgressUpdate {
    pub(crate) fn from_snapshot(
        tick: u64,
        interval: Duration,
        duration: Option<Duration>,
        vus: (u64, u64),
        previous_iterations: u64,
        metrics: MetricsSnapshot,
    ) -> Self {
        let iterations_total = metrics.counter_total(ITERATIONS);
        let (checks_passes, checks_total) = match metrics.get(CHECKS).map(|m| &m.values) {
            Some(swarmr_metrics::MetricValues::Rate { passes, total }) => (*passes, *total),
            _ => (0, 0),
        };
        let (avg, p95) = metrics
            .get(ITERATION_DURATION)
            .and_then(|m| m.trend())
            .map(|t| (t.avg(), t.percentile(95.0)))
            .unwrap_or_default();

        let delta = iterations_total.saturating_sub(previous_iterations);
        let secs = interval.as_secs_f64();
        let iterations_per_sec_now = if secs > 0.0 { delta as f64 / secs } else { 0.0 };

        Self {
            tick,
            elapsed: metrics.elapsed(),
            interval,
            duration,
            vus_total: vus.0,
            vus_running: vus.1,
            iterations_total,
            iteration_errors: metrics.counter_total(ITERATION_ERRORS),
            checks_passes,
            checks_total,
            iteration_duration_avg_ms: avg,
            iteration_duration_p95_ms: p95,
            iterations_per_sec_now,
            metrics,
        }
    }
}

pub type ProgressFn = std::sync::Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;
