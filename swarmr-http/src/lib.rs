#![forbid(unsafe_code)]

mod client;
mod confirm;
mod error;
mod json_path;
mod shape;
mod types;
mod util;

pub use client::HttpClient;
pub use confirm::{Confirmation, ConfirmationOutcome, ConfirmationPolicy};
pub use error::{Error, HttpTransportErrorKind, Result};
pub use shape::{ResolvedList, ResponseShape, ShapeResolver};
pub use types::{HttpRequest, HttpResponse};

pub use http::Method;
