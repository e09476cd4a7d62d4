mod dataset;
mod error;
mod loader;
mod schema;

pub use dataset::{MalformedLine, Record, SharedDataset};
pub use error::{Error, Result};
pub use loader::DatasetLoader;
pub use schema::{FieldKind, FieldSpec, LoadMode, Schema};
pub use swarmr_value::Value;
