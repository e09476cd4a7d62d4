pub type Result<T> = std::result::Result<T, Error>;

/// Fatal setup errors. Any of these aborts a run before a virtual user starts.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("`vus` must be a positive integer")]
    InvalidVus,

    #[error("either `iterations` or `duration` must be set")]
    MissingBound,

    #[error("`duration` must be a positive duration")]
    InvalidDuration,

    #[error("`progress_interval` must be a positive duration")]
    InvalidProgressInterval,

    #[error("invalid threshold `{expression}` for metric `{metric}`: {reason}")]
    InvalidThreshold {
        metric: String,
        expression: String,
        reason: String,
    },

    #[error(transparent)]
    Metric(#[from] swarmr_metrics::Error),

    #[error(transparent)]
    Data(#[from] swarmr_data::Error),
}
