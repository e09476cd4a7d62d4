use swarmr_metrics::{MetricSnapshot, MetricValues, MetricsSnapshot, per_sec};

use crate::thresholds::{Severity, ThresholdAgg, ThresholdRule};

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdOutcome {
    pub rule: ThresholdRule,
    /// `None` when the aggregation does not apply to the metric's kind.
    pub observed: Option<f64>,
    pub passed: bool,
}

/// Scores every rule against `snapshot`.
///
/// A metric that was never registered, or that has no samples, reads as `0` for every
/// aggregation. The rule then passes only if `0` itself satisfies the comparison.
pub fn evaluate(snapshot: &MetricsSnapshot, rules: &[ThresholdRule]) -> Vec<ThresholdOutcome> {
    rules
        .iter()
        .map(|rule| {
            let observed = observed_value(snapshot, rule);
            let passed = observed.is_some_and(|v| rule.expr.op.compare(v, rule.expr.value));
            ThresholdOutcome {
                rule: rule.clone(),
                observed,
                passed,
            }
        })
        .collect()
}

/// Checks `Abort` rules mid-run and returns the first one failing.
///
/// Metrics without samples are skipped here: an empty `checks` rate at the first tick is
/// not evidence of anything yet.
pub(crate) fn first_abort_violation<'a>(
    snapshot: &MetricsSnapshot,
    rules: &'a [ThresholdRule],
) -> Option<(&'a ThresholdRule, Option<f64>)> {
    rules
        .iter()
        .filter(|r| r.severity == Severity::Abort)
        .filter(|r| snapshot.get(&r.metric).is_some_and(|m| m.count() > 0))
        .find_map(|rule| {
            let observed = observed_value(snapshot, rule);
            let passed = observed.is_some_and(|v| rule.expr.op.compare(v, rule.expr.value));
            (!passed).then_some((rule, observed))
        })
}

pub fn observed_value(snapshot: &MetricsSnapshot, rule: &ThresholdRule) -> Option<f64> {
    let Some(metric) = snapshot.get(&rule.metric) else {
        return Some(0.0);
    };
    if metric.count() == 0 {
        return Some(0.0);
    }
    aggregate(metric, rule.expr.agg, snapshot.elapsed().as_secs_f64())
}

fn aggregate(metric: &MetricSnapshot, agg: ThresholdAgg, elapsed_secs: f64) -> Option<f64> {
    match (&metric.values, agg) {
        (MetricValues::Counter { total }, ThresholdAgg::Count | ThresholdAgg::Sum) => {
            Some(*total as f64)
        }
        (MetricValues::Counter { total }, ThresholdAgg::Rate) => {
            Some(per_sec(*total, elapsed_secs))
        }

        (MetricValues::Trend(t), agg) => match agg {
            ThresholdAgg::Avg => Some(t.avg()),
            ThresholdAgg::Min => Some(t.min()),
            ThresholdAgg::Max => Some(t.max()),
            ThresholdAgg::Med => Some(t.med()),
            ThresholdAgg::Count => Some(t.count() as f64),
            ThresholdAgg::Sum => Some(t.sum()),
            ThresholdAgg::P(p) => Some(t.percentile(p)),
            ThresholdAgg::Rate => None,
        },

        (MetricValues::Rate { .. }, ThresholdAgg::Rate) => metric.pass_fraction(),
        (MetricValues::Rate { total, .. }, ThresholdAgg::Count) => Some(*total as f64),
        (MetricValues::Rate { passes, .. }, ThresholdAgg::Sum) => Some(*passes as f64),

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thresholds::{ThresholdSet, parse_rules};
    use std::time::{Duration, Instant};
    use swarmr_metrics::Registry;

    fn rules(metric: &str, exprs: &[&str]) -> Vec<ThresholdRule> {
        let set = exprs
            .iter()
            .fold(ThresholdSet::new(metric), |s, e| s.expr(*e));
        parse_rules(&[set]).unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn zero_sample_metric_reads_as_zero() {
        let registry = Registry::default();
        registry.trend("latency").unwrap_or_else(|e| panic!("{e}"));
        let snap = registry.snapshot();

        let out = evaluate(&snap, &rules("latency", &["avg<100", "avg>1", "p(95)==0"]));
        assert_eq!(out[0].observed, Some(0.0));
        assert!(out[0].passed);
        assert!(!out[1].passed);
        assert!(out[2].passed);
    }

    #[test]
    fn unregistered_metric_reads_as_zero() {
        let snap = Registry::default().snapshot();
        let out = evaluate(&snap, &rules("never_seen", &["count>0", "rate<=0"]));
        assert_eq!(out[0].observed, Some(0.0));
        assert!(!out[0].passed);
        assert!(out[1].passed);
    }

    #[test]
    fn trend_aggregations_use_pinned_percentiles() {
        let registry = Registry::default();
        let t = registry.trend("d").unwrap_or_else(|e| panic!("{e}"));
        for v in 1..=10 {
            t.add(f64::from(v));
        }
        let snap = registry.snapshot();
        let out = evaluate(
            &snap,
            &rules(
                "d",
                &[
                    "p(90)>9.09",
                    "p(90)<9.11",
                    "p(50)==5.5",
                    "med==5.5",
                    "sum==55",
                    "count==10",
                    "min==1",
                    "max==10",
                ],
            ),
        );
        for o in &out {
            assert!(o.passed, "{} observed {:?}", o.rule.source, o.observed);
        }
    }

    #[test]
    fn rate_and_counter_aggregations() {
        let registry = Registry::default();
        registry.start_clock(Instant::now() - Duration::from_secs(2));
        let checks = registry.rate("checks").unwrap_or_else(|e| panic!("{e}"));
        let reqs = registry.counter("reqs").unwrap_or_else(|e| panic!("{e}"));
        for i in 0..20 {
            checks.add(i != 0);
        }
        reqs.add(10);
        let snap = registry.snapshot();

        let out = evaluate(&snap, &rules("checks", &["rate>0.9", "count==20", "sum==19"]));
        assert!(out.iter().all(|o| o.passed), "{out:?}");
        assert_eq!(out[0].observed, Some(0.95));

        let out = evaluate(&snap, &rules("reqs", &["count==10", "rate<=5"]));
        assert!(out.iter().all(|o| o.passed), "{out:?}");
    }

    #[test]
    fn aggregation_not_applicable_to_kind_fails() {
        let registry = Registry::default();
        let c = registry.counter("reqs").unwrap_or_else(|e| panic!("{e}"));
        c.add(1);
        let t = registry.trend("lat").unwrap_or_else(|e| panic!("{e}"));
        t.add(1.0);
        let snap = registry.snapshot();

        let out = evaluate(&snap, &rules("reqs", &["p(95)<100"]));
        assert_eq!(out[0].observed, None);
        assert!(!out[0].passed);

        let out = evaluate(&snap, &rules("lat", &["rate<1"]));
        assert_eq!(out[0].observed, None);
        assert!(!out[0].passed);
    }

    #[test]
    fn live_check_only_fires_on_abort_rules_with_samples() {
        let registry = Registry::default();
        let checks = registry.rate("checks").unwrap_or_else(|e| panic!("{e}"));
        let set = ThresholdSet::new("checks")
            .expr("rate>0.99")
            .abort_expr("rate>0.5");
        let rules = parse_rules(&[set]).unwrap_or_else(|e| panic!("{e}"));

        assert!(first_abort_violation(&registry.snapshot(), &rules).is_none());

        checks.add(true);
        checks.add(false);
        checks.add(false);
        let (rule, observed) = first_abort_violation(&registry.snapshot(), &rules)
            .unwrap_or_else(|| panic!("expected a violation"));
        assert_eq!(rule.source, "rate>0.5");
        assert!(observed.is_some_and(|v| v < 0.5));
    }
}
