use serde::Serialize;
use std::io::Write as _;
use std::sync::Arc;

use swarmr_core::{ReportDocument, StopReason, VuStateCounts};

use super::{OutputFormatter, RunHeader};

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _header: &RunHeader) {}

    fn progress(&self) -> Option<swarmr_core::ProgressFn> {
        Some(Arc::new(move |u| {
            let line = JsonProgressLine {
                kind: "progress",
                tick: u.tick,
                elapsed_secs: u.elapsed.as_secs_f64(),
                interval_secs: u.interval.as_secs_f64(),
                vus_running: u.vus_running,
                vus_total: u.vus_total,
                iterations_total: u.iterations_total,
                iteration_errors: u.iteration_errors,
                iterations_per_sec: u.iterations_per_sec_now,
                checks_passes: u.checks_passes,
                checks_total: u.checks_total,
                iteration_duration_avg_ms: u.iteration_duration_avg_ms,
                iteration_duration_p95_ms: u.iteration_duration_p95_ms,
            };
            emit_json_line(&line);
        }))
    }

    fn print_summary(&self, report: &ReportDocument) -> anyhow::Result<()> {
        let mut out = std::io::stdout().lock();
        for line in build_lines(report)? {
            serde_json::to_writer(&mut out, &line)?;
            writeln!(out)?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine {
    pub kind: &'static str,
    pub tick: u64,
    pub elapsed_secs: f64,
    pub interval_secs: f64,
    pub vus_running: u64,
    pub vus_total: u64,
    pub iterations_total: u64,
    pub iteration_errors: u64,
    pub iterations_per_sec: f64,
    pub checks_passes: u64,
    pub checks_total: u64,
    pub iteration_duration_avg_ms: f64,
    pub iteration_duration_p95_ms: f64,
}

#[derive(Debug, Serialize)]
struct Tagged<'a, T: Serialize> {
    kind: &'static str,
    #[serde(flatten)]
    data: &'a T,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub overall_passed: bool,
    pub iterations_total: u64,
    pub iterations_failed: u64,
    pub duration_secs: f64,
    pub stop_reason: Option<StopReason>,
    pub vus: VuStateCounts,
    pub thresholds_failed: usize,
}

/// One line per metric, threshold and check, then the `summary` line.
fn build_lines(report: &ReportDocument) -> serde_json::Result<Vec<serde_json::Value>> {
    let mut lines = Vec::with_capacity(
        report.metrics.len() + report.thresholds.len() + report.checks.len() + 1,
    );

    for m in &report.metrics {
        lines.push(serde_json::to_value(Tagged {
            kind: "metric",
            data: m,
        })?);
    }
    for t in &report.thresholds {
        lines.push(serde_json::to_value(Tagged {
            kind: "threshold",
            data: t,
        })?);
    }
    for c in &report.checks {
        lines.push(serde_json::to_value(Tagged {
            kind: "check",
            data: c,
        })?);
    }

    lines.push(serde_json::to_value(JsonSummaryLine {
        kind: "summary",
        overall_passed: report.overall_passed,
        iterations_total: report.iterations_total,
        iterations_failed: report.iterations_failed,
        duration_secs: report.duration_secs,
        stop_reason: report.stop_reason,
        vus: report.vus.clone(),
        thresholds_failed: report.thresholds.iter().filter(|t| !t.passed).count(),
    })?);

    Ok(lines)
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use swarmr_core::{CheckRecord, Severity, ThresholdRecord};

    #[test]
    fn summary_is_the_last_line_after_tagged_records() {
        let report = ReportDocument {
            overall_passed: true,
            iterations_total: 4,
            iterations_failed: 0,
            duration_secs: 0.5,
            stop_reason: None,
            vus: VuStateCounts {
                completed: 2,
                ..VuStateCounts::default()
            },
            metrics: Vec::new(),
            thresholds: vec![ThresholdRecord {
                metric: "checks".to_string(),
                expression: "rate>0.9".to_string(),
                severity: Severity::Abort,
                observed: Some(1.0),
                target: 0.9,
                passed: true,
            }],
            checks: vec![CheckRecord {
                name: "ok".to_string(),
                passes: 4,
                fails: 0,
                rate: 1.0,
            }],
        };

        let lines = build_lines(&report).unwrap_or_else(|e| panic!("{e}"));
        let kinds: Vec<&str> = lines
            .iter()
            .filter_map(|l| l.get("kind").and_then(Value::as_str))
            .collect();
        assert_eq!(kinds, vec!["threshold", "check", "summary"]);

        assert_eq!(
            lines[0].get("severity").and_then(Value::as_str),
            Some("abort")
        );
        assert_eq!(lines[1].get("passes").and_then(Value::as_u64), Some(4));

        let summary = &lines[2];
        assert_eq!(summary.get("overall_passed"), Some(&Value::Bool(true)));
        assert_eq!(summary.get("stop_reason"), Some(&Value::Null));
        assert_eq!(
            summary.pointer("/vus/completed").and_then(Value::as_u64),
            Some(2)
        );
    }

    #[test]
    fn progress_line_has_kind() {
        let line = JsonProgressLine {
            kind: "progress",
            tick: 1,
            elapsed_secs: 1.0,
            interval_secs: 1.0,
            vus_running: 2,
            vus_total: 2,
            iterations_total: 10,
            iteration_errors: 0,
            iterations_per_sec: 10.0,
            checks_passes: 10,
            checks_total: 10,
            iteration_duration_avg_ms: 5.0,
            iteration_duration_p95_ms: 9.0,
        };

        let v = serde_json::to_value(&line).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(v.get("kind").and_then(Value::as_str), Some("progress"));
        assert_eq!(v.get("vus_running").and_then(Value::as_u64), Some(2));
    }
}
