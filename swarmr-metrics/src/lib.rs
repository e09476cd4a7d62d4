pub mod agg;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod snapshot;

pub use agg::{RunningStats, per_sec, percentile};
pub use error::{Error, Result};
pub use metrics::{Counter, MetricHandle, MetricKind, Rate, Trend};
pub use registry::Registry;
pub use snapshot::{MetricSnapshot, MetricValues, MetricsSnapshot, TrendStats};
