//! Registry Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A registry error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A registry file is unreadable or structurally invalid. Recoverable:
    /// the failure is confined to one (channel, revision, type).
    #[display("cannot parse registry: {}", _0.display())]
    Parse(#[error(not(source))] PathBuf),
    /// A value could not be turned into JSON.
    #[display("cannot serialize {_0}")]
    Serialize(#[error(not(source))] String),
    /// An output document could not be written.
    #[display("cannot write {}", _0.display())]
    Write(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Write(_))
    }
}
