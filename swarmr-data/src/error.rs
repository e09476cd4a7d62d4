use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read dataset `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("io error while reading dataset: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed dataset line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("dataset `{source_name}` has no usable records ({skipped} malformed lines skipped)")]
    Empty { source_name: String, skipped: usize },

    #[error("dataset schema must declare at least one field")]
    EmptySchema,

    #[error("duplicate dataset field `{0}`")]
    DuplicateField(String),
}
