use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::agg::RunningStats;
use crate::snapshot::{MetricValues, TrendStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum MetricKind {
    Counter,
    Trend,
    Rate,
}

/// Append-only handle to a counter. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicU64>);

impl Counter {
    #[inline]
    pub fn add(&self, delta: u64) {
        self.0.fetch_add(delta, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment(&self) {
        self.add(1);
    }

    pub fn value(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
struct TrendLive {
    /// Samples recorded since the last read.
    pending: Vec<f64>,
    stats: RunningStats,
}

#[derive(Debug, Default)]
struct TrendShared {
    /// The only lock writers take.
    live: Mutex<TrendLive>,
    /// Every sample drained by a read so far, kept sorted. Readers only.
    sorted: Mutex<Vec<f64>>,
}

/// Append-only handle to a trend (a multiset of numeric samples).
#[derive(Debug, Clone, Default)]
pub struct Trend(Arc<TrendShared>);

impl Trend {
    /// Non-finite values are ignored so a single bad sample can't poison every aggregate.
    #[inline]
    pub fn add(&self, value: f64) {
        if !value.is_finite() {
            return;
        }

        let mut live = self.0.live.lock();
        live.pending.push(value);
        live.stats.push(value);
    }

    pub fn add_duration_ms(&self, d: std::time::Duration) {
        self.add(d.as_secs_f64() * 1000.0);
    }

    pub fn count(&self) -> u64 {
        self.0.live.lock().stats.count()
    }

    /// Writers are held only while the pending batch is swapped out. Sorting, merging and
    /// copying happen under the reader-side lock.
    pub(crate) fn stats(&self) -> TrendStats {
        // Lock order: `sorted`, then `live`. Holding `sorted` across the drain keeps the
        // samples and the running stats of concurrent readers in step.
        let mut sorted = self.0.sorted.lock();
        let (mut fresh, running) = {
            let mut live = self.0.live.lock();
            (std::mem::take(&mut live.pending), live.stats)
        };

        fresh.sort_unstable_by(f64::total_cmp);
        merge_sorted(&mut sorted, fresh);
        TrendStats::from_sorted(sorted.clone(), running)
    }
}

fn merge_sorted(sorted: &mut Vec<f64>, fresh: Vec<f64>) {
    if fresh.is_empty() {
        return;
    }
    if sorted.last().is_none_or(|last| last.total_cmp(&fresh[0]).is_le()) {
        sorted.extend(fresh);
        return;
    }

    let old = std::mem::take(sorted);
    sorted.reserve(old.len() + fresh.len());
    let (mut a, mut b) = (old.into_iter().peekable(), fresh.into_iter().peekable());
    loop {
        let next = match (a.peek(), b.peek()) {
            (Some(x), Some(y)) if x.total_cmp(y).is_le() => a.next(),
            (Some(_), Some(_)) => b.next(),
            (Some(_), None) => a.next(),
            (None, Some(_)) => b.next(),
            (None, None) => break,
        };
        sorted.extend(next);
    }
}

#[derive(Debug, Default)]
pub(crate) struct RateState {
    passes: u64,
    total: u64,
}

/// Append-only handle to a rate (fraction of `true` samples).
#[derive(Debug, Clone, Default)]
pub struct Rate(Arc<Mutex<RateState>>);

impl Rate {
    #[inline]
    pub fn add(&self, passed: bool) {
        let mut state = self.0.lock();
        state.total = state.total.saturating_add(1);
        if passed {
            state.passes = state.passes.saturating_add(1);
        }
    }

    /// Returns `(passes, total)` as one consistent pair.
    pub fn counts(&self) -> (u64, u64) {
        let state = self.0.lock();
        (state.passes, state.total)
    }
}

#[derive(Debug, Clone)]
pub enum MetricHandle {
    Counter(Counter),
    Trend(Trend),
    Rate(Rate),
}

impl MetricHandle {
    pub(crate) fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => Self::Counter(Counter::default()),
            MetricKind::Trend => Self::Trend(Trend::default()),
            MetricKind::Rate => Self::Rate(Rate::default()),
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Counter(_) => MetricKind::Counter,
            Self::Trend(_) => MetricKind::Trend,
            Self::Rate(_) => MetricKind::Rate,
        }
    }

    pub(crate) fn values(&self) -> MetricValues {
        match self {
            Self::Counter(c) => MetricValues::Counter { total: c.value() },
            Self::Trend(t) => MetricValues::Trend(t.stats()),
            Self::Rate(r) => {
                let (passes, total) = r.counts();
                MetricValues::Rate { passes, total }
            }
        }
    }
}
