//! Types shared by the carepath feature crates

mod error;

pub use error::{HttpError, error_body};
