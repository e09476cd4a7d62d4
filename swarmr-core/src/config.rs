use std::time::Duration;

use crate::error::{Error, Result};
use crate::thresholds::ThresholdSet;

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// How an iteration picks its dataset record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum DatasetSelection {
    /// `records[global_iteration mod len]`, where the global ordinal is assigned atomically
    /// when the iteration starts.
    #[default]
    RoundRobin,

    /// `records[(iteration * vus + vu_index) mod len]`. Every VU sees the same records on
    /// every run, independent of how VUs interleave.
    Striped,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub vus: u64,
    /// Iterations per VU.
    pub iterations: Option<u64>,
    pub duration: Option<Duration>,
    /// Pause after each iteration.
    pub iteration_delay: Option<Duration>,
    /// How long in-flight iterations may run after a stop before they are abandoned.
    pub grace_period: Duration,
    pub progress_interval: Duration,
    pub selection: DatasetSelection,
    pub thresholds: Vec<ThresholdSet>,
}

impl RunConfig {
    pub fn with_iterations(vus: u64, iterations: u64) -> Self {
        Self {
            iterations: Some(iterations),
            ..Self::base(vus)
        }
    }

    pub fn with_duration(vus: u64, duration: Duration) -> Self {
        Self {
            duration: Some(duration),
            ..Self::base(vus)
        }
    }

    fn base(vus: u64) -> Self {
        Self {
            vus,
            iterations: None,
            duration: None,
            iteration_delay: None,
            grace_period: DEFAULT_GRACE_PERIOD,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            selection: DatasetSelection::default(),
            thresholds: Vec::new(),
        }
    }

    #[must_use]
    pub fn threshold(mut self, set: ThresholdSet) -> Self {
        self.thresholds.push(set);
        self
    }

    #[must_use]
    pub fn iteration_delay(mut self, delay: Duration) -> Self {
        self.iteration_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    #[must_use]
    pub fn progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    #[must_use]
    pub fn selection(mut self, selection: DatasetSelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.vus == 0 {
            return Err(Error::InvalidVus);
        }
        if self.iterations.is_none() && self.duration.is_none() {
            return Err(Error::MissingBound);
        }
        if self.duration.is_some_and(|d| d.is_zero()) {
            return Err(Error::InvalidDuration);
        }
        if self.progress_interval.is_zero() {
            return Err(Error::InvalidProgressInterval);
        }
        Ok(())
    }
}

/// Run options as written in a plan file.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub vus: Option<u64>,
    pub iterations: Option<u64>,
    pub duration: Option<Duration>,
    pub iteration_delay: Option<Duration>,
    pub grace_period: Option<Duration>,
    pub selection: Option<DatasetSelection>,
    pub thresholds: Vec<ThresholdSet>,
}

/// Command-line overrides. Every value set here wins over [`RunOptions`].
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub vus: Option<u64>,
    pub iterations: Option<u64>,
    pub duration: Option<Duration>,
}

pub fn resolve_config(opts: RunOptions, overrides: RunOverrides) -> Result<RunConfig> {
    let vus = overrides.vus.or(opts.vus).unwrap_or(1);
    let iterations = overrides.iterations.or(opts.iterations);
    let duration = overrides.duration.or(opts.duration);

    let cfg = RunConfig {
        vus,
        iterations,
        duration,
        iteration_delay: opts.iteration_delay.filter(|d| !d.is_zero()),
        grace_period: opts.grace_period.unwrap_or(DEFAULT_GRACE_PERIOD),
        progress_interval: DEFAULT_PROGRESS_INTERVAL,
        selection: opts.selection.unwrap_or_default(),
        thresholds: opts.thresholds,
    };
    cfg.validate()?;
    Ok(cfg)
}
