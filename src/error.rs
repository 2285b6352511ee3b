//! Run Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;
use std::time::Duration;

/// A run error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for run operations.
pub type Result<T> = std::result::Result<T, Error>;

/// What went wrong with a run, by what an operator should do about it.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Conflicting flags, unknown bucket scheme or invalid configuration.
    /// Raised before any I/O.
    #[display("configuration error: {_0}")]
    Configuration(#[error(not(source))] String),
    /// Definition files could not be parsed and the run cannot continue.
    #[display("cannot parse definitions")]
    Parse,
    /// Validation findings require attention; notifications were sent first.
    #[display("errors processing Glean metrics")]
    Validation,
    /// A history manifest could not be loaded.
    #[display("cannot load history manifest {}", _0.display())]
    History(#[error(not(source))] PathBuf),
    /// Output could not be written locally.
    #[display("cannot write output under {}", _0.display())]
    Output(#[error(not(source))] PathBuf),
    /// Remote pull or push failed.
    #[display("remote storage error")]
    Storage,
    /// Nothing to publish.
    #[display("{} is empty", _0.display())]
    EmptyOutput(#[error(not(source))] PathBuf),
    /// Publication did not finish before the run-level deadline.
    #[display("publication exceeded {}s", _0.as_secs())]
    Timeout(#[error(not(source))] Duration),
    /// Notifications could not be delivered.
    #[display("cannot deliver notifications")]
    Notify,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage | Self::Timeout(_) | Self::Notify)
    }

    /// Process exit status for a run that failed with this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration(_) => 2,
            _ => 1,
        }
    }
}
