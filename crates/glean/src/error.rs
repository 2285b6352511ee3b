//! Glean Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A Glean processing error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for Glean operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A definition file is unreadable or not a mapping.
    #[display("improper definition file: {}", _0.display())]
    Parse(#[error(not(source))] PathBuf),
    /// Definitions parsed, but some of them are invalid.
    #[display("error in processing commit {commit} of {repository}: {}", errors.join("; "))]
    Definitions { repository: String, commit: String, errors: Vec<String> },
    /// Conflicting or unknown repository selection.
    #[display("invalid repository selection: {_0}")]
    Selection(#[error(not(source))] String),
    /// The repositories file could not be loaded.
    #[display("cannot load repositories from {}", _0.display())]
    Repositories(#[error(not(source))] PathBuf),
    /// A published state document could not be read or written.
    #[display("cannot access repository state at {}", _0.display())]
    State(#[error(not(source))] PathBuf),
    /// A notification could not be delivered.
    #[display("cannot deliver notification: {_0}")]
    Notify(#[error(not(source))] String),
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::State(_) | Self::Notify(_))
    }

    /// Whether this error came from the contents of a definition file.
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse(_) | Self::Definitions { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definitions_display() {
        let kind = ErrorKind::Definitions {
            repository: "glean-core".to_string(),
            commit: "abc123".to_string(),
            errors: vec!["app.launch: missing type".to_string(), "app.stop: missing type".to_string()],
        };
        assert_eq!(
            kind.to_string(),
            "error in processing commit abc123 of glean-core: app.launch: missing type; app.stop: missing type"
        );
        assert!(kind.is_parse());
        assert!(!kind.is_retryable());
    }
}
