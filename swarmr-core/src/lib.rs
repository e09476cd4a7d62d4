mod checks;
mod config;
mod context;
mod error;
mod gate;
mod iteration_metrics;
mod progress;
mod runner;
mod scenario;
mod scheduler;
mod summary;
mod thresholds;
mod thresholds_eval;
mod vu;

pub use checks::{CheckRecorder, CheckResult, CheckSummary};
pub use config::{
    DEFAULT_GRACE_PERIOD, DEFAULT_PROGRESS_INTERVAL, DatasetSelection, RunConfig, RunOptions,
    RunOverrides, resolve_config,
};
pub use context::IterationContext;
pub use error::{Error, Result};
pub use gate::{StopHandle, StopReason};
pub use iteration_metrics::{
    CHECKS, ITERATION_DURATION, ITERATION_ERRORS, ITERATIONS, IterationMetrics,
};
pub use progress::{ProgressFn, ProgressUpdate};
pub use runner::{IterationOutcome, ScenarioRunner};
pub use scenario::{Scenario, ScenarioFn, scenario_fn};
pub use scheduler::{RunContext, run};
pub use summary::{
    CheckRecord, MetricRecord, ReportDocument, RunResult, ThresholdRecord, VuStateCounts, render,
};
pub use thresholds::{
    Severity, ThresholdAgg, ThresholdDef, ThresholdExpr, ThresholdOp, ThresholdRule,
    ThresholdSet, parse_rules, parse_threshold_expr,
};
pub use thresholds_eval::{ThresholdOutcome, evaluate, observed_value};
pub use vu::{VuReport, VuState};

pub use swarmr_data::{Record, SharedDataset};
pub use swarmr_metrics::{Counter, MetricKind, MetricsSnapshot, Rate, Registry, Trend};
