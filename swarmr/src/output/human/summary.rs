use std::fmt::Write as _;

use swarmr_core::{MetricRecord, ReportDocument};

use super::format::{format_percent, format_rate, format_trend_value};

pub(crate) fn render(doc: &ReportDocument) -> String {
    let mut out = String::new();

    out.push_str("summary\n");
    let stop = doc
        .stop_reason
        .map_or_else(|| "iterations exhausted".to_string(), |r| r.to_string());
    writeln!(out, "  stop: {stop}").ok();
    writeln!(out, "  duration: {:.2}s", doc.duration_secs).ok();
    writeln!(
        out,
        "  iterations: {} (failed {})",
        doc.iterations_total, doc.iterations_failed
    )
    .ok();
    writeln!(
        out,
        "  vus: completed={} aborted={} abandoned={}",
        doc.vus.completed, doc.vus.aborted, doc.vus.abandoned
    )
    .ok();

    render_checks(doc, &mut out);
    render_metrics(doc, &mut out);
    render_thresholds(doc, &mut out);

    let verdict = if doc.overall_passed { "PASSED" } else { "FAILED" };
    writeln!(out, "\nresult: {verdict}").ok();

    out
}

fn render_checks(doc: &ReportDocument, out: &mut String) {
    if doc.checks.is_empty() {
        return;
    }

    out.push_str("\nchecks\n");
    for c in &doc.checks {
        let status = if c.fails > 0 { "FAIL" } else { "OK" };
        writeln!(
            out,
            "  {}: pass={} fail={} ({}) [{status}]",
            c.name,
            c.passes,
            c.fails,
            format_percent(c.rate)
        )
        .ok();
    }
}

fn render_metrics(doc: &ReportDocument, out: &mut String) {
    if doc.metrics.is_empty() {
        return;
    }

    out.push_str("\nmetrics\n");
    for m in &doc.metrics {
        writeln!(out, "  {}: {}", m.name, metric_line(m)).ok();
    }
}

fn metric_line(m: &MetricRecord) -> String {
    match m.kind.as_str() {
        "counter" => format!(
            "count={} rate={}/s",
            m.count,
            format_rate(m.rate.unwrap_or_default())
        ),
        "rate" => format!(
            "{} ({}/{})",
            format_percent(m.rate.unwrap_or_default()),
            m.passes.unwrap_or_default(),
            m.count
        ),
        _ if m.count == 0 => "n=0".to_string(),
        _ => {
            let v = |x: Option<f64>| format_trend_value(&m.name, x.unwrap_or_default());
            format!(
                "avg={} min={} med={} max={} p(90)={} p(95)={} p(99)={} (n={})",
                v(m.avg),
                v(m.min),
                v(m.med),
                v(m.max),
                v(m.p90),
                v(m.p95),
                v(m.p99),
                m.count
            )
        }
    }
}

fn render_thresholds(doc: &ReportDocument, out: &mut String) {
    if doc.thresholds.is_empty() {
        return;
    }

    out.push_str("\nthresholds\n");
    for t in &doc.thresholds {
        let status = if t.passed { "PASS" } else { "FAIL" };
        let observed = t
            .observed
            .map_or_else(|| "n/a".to_string(), |o| format!("{o:.4}"));
        writeln!(
            out,
            "  {} {} [{}]: {status} (observed {observed})",
            t.metric, t.expression, t.severity
        )
        .ok();
    }
}
