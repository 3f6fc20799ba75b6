//! Shared utilities: error types, INN validation, prompt hygiene.

pub mod error;
pub mod inn;
pub mod sanitize;

pub use error::{AppError, AppResult, ErrorKind};
