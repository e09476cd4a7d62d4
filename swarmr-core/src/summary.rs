use std::time::Duration;

use serde::Serialize;
use swarmr_metrics::{MetricSnapshot, MetricValues, MetricsSnapshot};

use crate::checks::CheckSummary;
use crate::gate::StopReason;
use crate::thresholds::Severity;
use crate::thresholds_eval::ThresholdOutcome;
use crate::vu::{VuReport, VuState};

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub vus: Vec<VuReport>,
    pub iterations_total: u64,
    pub iterations_failed: u64,
    pub elapsed: Duration,
    pub metrics: MetricsSnapshot,
    pub thresholds: Vec<ThresholdOutcome>,
    pub checks: Vec<CheckSummary>,
    /// `None` when every VU ran out of iterations on its own.
    pub stop_reason: Option<StopReason>,
}

impl RunResult {
    pub fn overall_passed(&self) -> bool {
        self.thresholds.iter().all(|t| t.passed)
    }

    pub fn thresholds_failed(&self) -> impl Iterator<Item = &ThresholdOutcome> {
        self.thresholds.iter().filter(|t| !t.passed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VuStateCounts {
    pub completed: u64,
    pub aborted: u64,
    pub abandoned: u64,
    /// VUs that never left `Idle` or `Running`. Non-zero only if a task was lost.
    pub other: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRecord {
    pub name: String,
    pub kind: String,
    pub count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub med: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p90: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p95: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p99: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdev: Option<f64>,
    /// Pass fraction for rates, per-second throughput for counters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdRecord {
    pub metric: String,
    pub expression: String,
    pub severity: Severity,
    pub observed: Option<f64>,
    pub target: f64,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckRecord {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
    pub rate: f64,
}

/// Serializable end-of-run report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportDocument {
    pub overall_passed: bool,
    pub iterations_total: u64,
    pub iterations_failed: u64,
    pub duration_secs: f64,
    pub stop_reason: Option<StopReason>,
    pub vus: VuStateCounts,
    pub metrics: Vec<MetricRecord>,
    pub thresholds: Vec<ThresholdRecord>,
    pub checks: Vec<CheckRecord>,
}

pub fn render(result: &RunResult) -> ReportDocument {
    let elapsed_secs = result.metrics.elapsed().as_secs_f64();

    let mut vus = VuStateCounts::default();
    for vu in &result.vus {
        match vu.state {
            VuState::Completed => vus.completed += 1,
            VuState::Aborted => vus.aborted += 1,
            VuState::Abandoned => vus.abandoned += 1,
            VuState::Idle | VuState::Running => vus.other += 1,
        }
    }

    let metrics = result
        .metrics
        .iter()
        .map(|m| metric_record(m, elapsed_secs))
        .collect();

    let thresholds = result
        .thresholds
        .iter()
        .map(|t| ThresholdRecord {
            metric: t.rule.metric.clone(),
            expression: t.rule.source.clone(),
            severity: t.rule.severity,
            observed: t.observed,
            target: t.rule.expr.value,
            passed: t.passed,
        })
        .collect();

    let checks = result
        .checks
        .iter()
        .map(|c| {
            let total = c.passes.saturating_add(c.fails);
            CheckRecord {
                name: c.name.clone(),
                passes: c.passes,
                fails: c.fails,
                rate: if total == 0 {
                    0.0
                } else {
                    c.passes as f64 / total as f64
                },
            }
        })
        .collect();

    ReportDocument {
        overall_passed: result.overall_passed(),
        iterations_total: result.iterations_total,
        iterations_failed: result.iterations_failed,
        duration_secs: result.elapsed.as_secs_f64(),
        stop_reason: result.stop_reason,
        vus,
        metrics,
        thresholds,
        checks,
    }
}

fn metric_record(metric: &MetricSnapshot, elapsed_secs: f64) -> MetricRecord {
    let mut rec = MetricRecord {
        name: metric.name.clone(),
        kind: metric.kind().to_string(),
        count: 0,
        sum: None,
        avg: None,
        min: None,
        max: None,
        med: None,
        p90: None,
        p95: None,
        p99: None,
        stdev: None,
        rate: None,
        passes: None,
    };

    match &metric.values {
        MetricValues::Counter { total } => {
            rec.count = *total;
            rec.sum = Some(*total as f64);
            rec.rate = Some(swarmr_metrics::per_sec(*total, elapsed_secs));
        }
        MetricValues::Trend(t) => {
            rec.count = t.count();
            rec.sum = Some(t.sum());
            rec.avg = Some(t.avg());
            rec.min = Some(t.min());
            rec.max = Some(t.max());
            rec.med = Some(t.med());
            rec.p90 = Some(t.percentile(90.0));
            rec.p95 = Some(t.percentile(95.0));
            rec.p99 = Some(t.percentile(99.0));
            rec.stdev = Some(t.stdev());
        }
        MetricValues::Rate { passes, total } => {
            rec.count = *total;
            rec.passes = Some(*passes);
            rec.rate = Some(if *total == 0 {
                0.0
            } else {
                *passes as f64 / *total as f64
            });
        }
    }

    rec
}
