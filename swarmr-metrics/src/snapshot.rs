use std::collections::BTreeMap;
use std::time::Duration;

use crate::agg::{RunningStats, per_sec, percentile};
use crate::metrics::MetricKind;

/// Frozen trend statistics. Samples are kept sorted so any percentile can be derived.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrendStats {
    sorted: Vec<f64>,
    running: RunningStats,
}

impl TrendStats {
    pub(crate) fn new(mut samples: Vec<f64>, running: RunningStats) -> Self {
        samples.sort_unstable_by(f64::total_cmp);
        Self {
            sorted: samples,
            running,
        }
    }

    pub(crate) fn from_sorted(sorted: Vec<f64>, running: RunningStats) -> Self {
        Self { sorted, running }
    }

    pub fn from_samples(samples: impl IntoIterator<Item = f64>) -> Self {
        let mut running = RunningStats::default();
        let samples: Vec<f64> = samples
            .into_iter()
            .filter(|v| v.is_finite())
            .inspect(|v| running.push(*v))
            .collect();
        Self::new(samples, running)
    }

    pub fn count(&self) -> u64 {
        self.running.count()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.running.sum()
    }

    pub fn avg(&self) -> f64 {
        self.running.mean()
    }

    pub fn min(&self) -> f64 {
        self.running.min()
    }

    pub fn max(&self) -> f64 {
        self.running.max()
    }

    pub fn stdev(&self) -> f64 {
        self.running.stdev()
    }

    pub fn med(&self) -> f64 {
        self.percentile(50.0)
    }

    pub fn percentile(&self, p: f64) -> f64 {
        percentile(&self.sorted, p)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricValues {
    Counter { total: u64 },
    Trend(TrendStats),
    Rate { passes: u64, total: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricSnapshot {
    pub name: String,
    pub values: MetricValues,
}

impl MetricSnapshot {
    pub fn kind(&self) -> MetricKind {
        match self.values {
            MetricValues::Counter { .. } => MetricKind::Counter,
            MetricValues::Trend(_) => MetricKind::Trend,
            MetricValues::Rate { .. } => MetricKind::Rate,
        }
    }

    /// Number of recorded samples (counter total for counters).
    pub fn count(&self) -> u64 {
        match &self.values {
            MetricValues::Counter { total } => *total,
            MetricValues::Trend(t) => t.count(),
            MetricValues::Rate { total, .. } => *total,
        }
    }

    /// Fraction of passing samples for rates, 0 when nothing was recorded.
    pub fn pass_fraction(&self) -> Option<f64> {
        match self.values {
            MetricValues::Rate { passes, total } if total > 0 => {
                Some(passes as f64 / total as f64)
            }
            MetricValues::Rate { .. } => Some(0.0),
            _ => None,
        }
    }

    pub fn trend(&self) -> Option<&TrendStats> {
        match &self.values {
            MetricValues::Trend(t) => Some(t),
            _ => None,
        }
    }
}

/// Point-in-time view of every metric in a registry, ordered by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    metrics: BTreeMap<String, MetricSnapshot>,
    elapsed: Duration,
}

impl MetricsSnapshot {
    pub(crate) fn new(metrics: BTreeMap<String, MetricSnapshot>, elapsed: Duration) -> Self {
        Self { metrics, elapsed }
    }

    pub fn get(&self, name: &str) -> Option<&MetricSnapshot> {
        self.metrics.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricSnapshot> {
        self.metrics.values()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Time since the registry clock was started when the snapshot was taken.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn counter_total(&self, name: &str) -> u64 {
        match self.get(name).map(|m| &m.values) {
            Some(MetricValues::Counter { total }) => *total,
            _ => 0,
        }
    }

    pub fn counter_per_sec(&self, name: &str) -> f64 {
        per_sec(self.counter_total(name), self.elapsed.as_secs_f64())
    }
}
