use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::metrics::{Counter, MetricHandle, MetricKind, Rate, Trend};
use crate::snapshot::{MetricSnapshot, MetricsSnapshot};

/// Named metrics for a single run.
///
/// Each metric owns its own storage; the map is only touched on registration and when taking
/// snapshots, so writers holding a handle never contend on a registry-wide lock.
#[derive(Debug, Default)]
pub struct Registry {
    metrics: DashMap<Arc<str>, MetricHandle>,
    started: OnceLock<Instant>,
}

impl Registry {
    /// Registers `name` as `kind`, or returns the existing handle when it is already
    /// registered with the same kind.
    pub fn register(&self, name: &str, kind: MetricKind) -> Result<MetricHandle> {
        validate_name(name)?;

        match self.metrics.entry(Arc::from(name)) {
            Entry::Occupied(e) => {
                let existing = e.get().kind();
                if existing != kind {
                    return Err(Error::MetricConflict {
                        name: name.to_string(),
                        existing,
                        requested: kind,
                    });
                }
                Ok(e.get().clone())
            }
            Entry::Vacant(e) => {
                let handle = MetricHandle::new(kind);
                e.insert(handle.clone());
                Ok(handle)
            }
        }
    }

    pub fn counter(&self, name: &str) -> Result<Counter> {
        match self.register(name, MetricKind::Counter)? {
            MetricHandle::Counter(c) => Ok(c),
            other => Err(conflict(name, other.kind(), MetricKind::Counter)),
        }
    }

    pub fn trend(&self, name: &str) -> Result<Trend> {
        match self.register(name, MetricKind::Trend)? {
            MetricHandle::Trend(t) => Ok(t),
            other => Err(conflict(name, other.kind(), MetricKind::Trend)),
        }
    }

    pub fn rate(&self, name: &str) -> Result<Rate> {
        match self.register(name, MetricKind::Rate)? {
            MetricHandle::Rate(r) => Ok(r),
            other => Err(conflict(name, other.kind(), MetricKind::Rate)),
        }
    }

    pub fn kind_of(&self, name: &str) -> Option<MetricKind> {
        self.metrics.get(name).map(|h| h.kind())
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Anchors `MetricsSnapshot::elapsed`. Only the first call has an effect.
    pub fn start_clock(&self, started: Instant) {
        let _ = self.started.set(started);
    }

    pub fn elapsed(&self) -> Duration {
        self.started
            .get()
            .map(Instant::elapsed)
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        // Collect handles first so no shard guard is held while a metric lock is taken.
        let handles: Vec<(Arc<str>, MetricHandle)> = self
            .metrics
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        let elapsed = self.elapsed();
        let metrics = handles
            .into_iter()
            .map(|(name, handle)| {
                let name = name.to_string();
                let snapshot = MetricSnapshot {
                    name: name.clone(),
                    values: handle.values(),
                };
                (name, snapshot)
            })
            .collect::<BTreeMap<_, _>>();

        MetricsSnapshot::new(metrics, elapsed)
    }
}

fn conflict(name: &str, existing: MetricKind, requested: MetricKind) -> Error {
    Error::MetricConflict {
        name: name.to_string(),
        existing,
        requested,
    }
}

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidName(name.to_string()))
    }
}
