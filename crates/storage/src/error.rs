//! Storage Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. Location, scheme and pattern errors are configuration
//! mistakes and are never worth retrying; only transport failures are.

use derive_more::{Display, Error};
use probeinfo_compress::error::{Error as CompressionError, ErrorKind as CompressionErrorKind};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// File or object does not exist
    #[display("file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Access denied (permissions or credentials)
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Network-related error (S3/GCS requests)
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// Path contains invalid characters or escapes root
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// Backend-specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
    /// Compression/decompression error
    #[display("compression error: {_0}")]
    Compression(CompressionErrorKind),
    /// The remote location names a scheme with no backend.
    #[display("unsupported storage scheme: {_0}")]
    UnsupportedScheme(#[error(not(source))] String),
    /// The remote location could not be parsed.
    #[display("invalid remote location: {_0}")]
    InvalidLocation(#[error(not(source))] String),
    /// An exclude pattern is not a valid glob.
    #[display("invalid exclude pattern: {_0}")]
    InvalidPattern(#[error(not(source))] String),
    /// A backend needs credentials that were not configured.
    #[display("missing credentials for {_0}")]
    Credentials(#[error(not(source))] String),
    /// The requested combination of sync options is not supported.
    #[display("unsupported operation: {_0}")]
    Unsupported(#[error(not(source))] &'static str),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}
impl ErrorKind {
    /// Convert a compression error into a storage error, preserving the
    /// compress crate's `Exn` frame (error tree) as a child in its own
    /// error tree.
    #[track_caller]
    pub fn compression(err: CompressionError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Compression(inner))
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Network(_) | Self::BackendError(_))
    }

    /// Returns `true` for mistakes in configuration or invocation, which no
    /// amount of retrying will fix.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedScheme(_)
                | Self::InvalidLocation(_)
                | Self::InvalidPattern(_)
                | Self::Credentials(_)
                | Self::Unsupported(_)
        )
    }
}
