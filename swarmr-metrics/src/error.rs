use crate::metrics::MetricKind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("metric `{name}` is already registered as a {existing}, cannot register it as a {requested}")]
    MetricConflict {
        name: String,
        existing: MetricKind,
        requested: MetricKind,
    },

    #[error("invalid metric name `{0}` (expected letters, digits, `_` or `.`)")]
    InvalidName(String),
}
