//! Configuration Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The layered configuration could not be extracted or failed validation.
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
    /// A document could not be read from disk.
    #[display("cannot read document: {}", _0.display())]
    Read(#[error(not(source))] PathBuf),
    /// A document was read but is not valid YAML/JSON of the expected shape.
    #[display("cannot parse document: {}", _0.display())]
    Parse(#[error(not(source))] PathBuf),
    /// The file extension names no known document format.
    #[display("unsupported document format: {}", _0.display())]
    UnsupportedFormat(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Only reading from disk can plausibly succeed on a second attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Read(_))
    }
}
