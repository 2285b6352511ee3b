//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait, which provides a unified
//! interface for object operations across different backends (local
//! filesystem, S3, Google Cloud Storage). Keys are always relative to the
//! bucket root; [`RemoteLocation`](crate::RemoteLocation) turns sync-relative
//! paths into keys.

#[cfg(feature = "gcs")]
mod gcs;
mod local;
#[cfg(any(test, feature = "mock"))]
mod mock;
#[cfg(feature = "s3")]
mod s3;

#[cfg(feature = "gcs")]
pub use self::gcs::GcsBackend;
pub use self::local::LocalBackend;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockBackend;
#[cfg(feature = "s3")]
pub use self::s3::{S3Backend, S3Options};
use crate::error::Result;
use crate::models::{FileInfo, Headers};
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::path::Path;
use std::pin::Pin;

pub(crate) type FileInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<FileInfo>> + Send + 'a>>;

/// Unified interface for storage backends.
///
/// All storage operations are asynchronous to efficiently handle network
/// operations and concurrent access.
///
/// # Path Handling
/// All keys are relative to the bucket root and must be validated using
/// [`validate_path`](crate::validate_path) before use. Implementations
/// enforce this validation.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use probeinfo_storage::{StorageBackend, error::Result};
///
/// async fn last_update(backend: &dyn StorageBackend) -> Result<Option<Vec<u8>>> {
///     let path = Path::new("glean/fenix/general");
///     if backend.exists(path).await? {
///         Ok(Some(backend.read(path).await?))
///     } else {
///         Ok(None)
///     }
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the backend, used for logging only.
    fn name(&self) -> &str;

    /// List all objects matching an optional prefix.
    ///
    /// Default implementation of this method is to collect all the results
    /// from [`list_stream()`](Self::list_stream) into a [`Vec`] before
    /// returning.
    async fn list(&self, prefix: Option<&Path>) -> Result<Vec<FileInfo>> {
        self.list_stream(prefix).try_collect().await
    }

    /// Stream object metadata matching an optional prefix.
    ///
    /// Prefixes match whole path components: `glean/fenix` matches
    /// `glean/fenix/metrics` and the object `glean/fenix` itself, but not
    /// `glean/fenix-nightly/metrics`. Listing a prefix with nothing under it
    /// yields nothing rather than an error.
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::TryStreamExt;
    /// use std::path::Path;
    /// # use probeinfo_storage::{StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    ///
    /// let mut stream = backend.list_stream(Some(Path::new("glean")));
    /// while let Some(info) = stream.try_next().await? {
    ///     println!("{}: {} bytes", info.path.display(), info.size);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a>;

    /// Check if an object exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Read object contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the object
    /// does not exist.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Write object contents, replacing any existing object.
    ///
    /// `headers` are stored as object metadata where the backend has any.
    /// Implementations create parent directories as needed.
    async fn write(&self, path: &Path, data: &[u8], headers: &Headers) -> Result<()>;

    /// Delete an object.
    ///
    /// Local and in-memory backends return
    /// [`NotFound`](crate::error::ErrorKind::NotFound) if the object does not
    /// exist; object stores treat deleting a missing key as success.
    async fn delete(&self, path: &Path) -> Result<()>;

    /// Get object metadata without reading contents.
    async fn stat(&self, path: &Path) -> Result<FileInfo>;
}
