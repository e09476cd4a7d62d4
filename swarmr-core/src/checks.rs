use std::sync::Arc;

use dashmap::DashMap;
use swarmr_metrics::Rate;

/// One evaluated assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckResult<'a> {
    pub name: &'a str,
    pub passed: bool,
    pub vu_id: u64,
    pub iteration: u64,
}

#[derive(Debug, Default)]
struct CheckTally {
    passes: u64,
    fails: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSummary {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

/// Feeds every check into the run-wide `checks` rate and a per-name tally.
#[derive(Debug, Clone)]
pub struct CheckRecorder {
    rate: Rate,
    tallies: Arc<DashMap<Arc<str>, CheckTally>>,
}

impl CheckRecorder {
    pub fn new(rate: Rate) -> Self {
        Self {
            rate,
            tallies: Arc::new(DashMap::new()),
        }
    }

    pub fn record(&self, result: CheckResult<'_>) {
        self.rate.add(result.passed);

        // Avoid allocating the key on the hot path once a name has been seen.
        if let Some(mut tally) = self.tallies.get_mut(result.name) {
            bump(&mut tally, result.passed);
        } else {
            let mut tally = self.tallies.entry(Arc::from(result.name)).or_default();
            bump(&mut tally, result.passed);
        }

        if !result.passed {
            log::debug!(
                "check `{}` failed (vu {}, iteration {})",
                result.name,
                result.vu_id,
                result.iteration
            );
        }
    }

    /// Per-name tallies, sorted by name.
    pub fn summaries(&self) -> Vec<CheckSummary> {
        let mut out: Vec<CheckSummary> = self
            .tallies
            .iter()
            .map(|e| CheckSummary {
                name: e.key().to_string(),
                passes: e.value().passes,
                fails: e.value().fails,
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}

fn bump(tally: &mut CheckTally, passed: bool) {
    if passed {
        tally.passes = tally.passes.saturating_add(1);
    } else {
        tally.fails = tally.fails.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarmr_metrics::Registry;

    #[test]
    fn checks_feed_rate_and_per_name_tallies() {
        let registry = Registry::default();
        let rec = CheckRecorder::new(registry.rate("checks").unwrap_or_else(|e| panic!("{e}")));

        for (i, (name, passed)) in [("status is 200", true), ("body ok", false), ("status is 200", true)]
            .into_iter()
            .enumerate()
        {
            rec.record(CheckResult {
                name,
                passed,
                vu_id: 1,
                iteration: i as u64,
            });
        }

        assert_eq!(
            rec.summaries(),
            vec![
                CheckSummary {
                    name: "body ok".to_string(),
                    passes: 0,
                    fails: 1
                },
                CheckSummary {
                    name: "status is 200".to_string(),
                    passes: 2,
                    fails: 0
                },
            ]
        );
        let snap = registry.snapshot();
        let fraction = snap.get("checks").and_then(|m| m.pass_fraction());
        assert!(fraction.is_some_and(|f| (f - 2.0 / 3.0).abs() < 1e-9));
    }
}
