//! In-memory storage backend for testing.

use super::FileInfoStream;
use crate::StorageBackend;
use crate::error::{ErrorKind, Result};
use crate::models::{FileInfo, Headers};
use crate::path::validate as validate_path;
use async_stream::stream;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::sync::RwLock;

#[derive(Clone, Debug)]
struct StoredObject {
    modified: OffsetDateTime,
    data: Vec<u8>,
    headers: Headers,
}

/// In-memory storage backend for testing.
///
/// Objects live in a map behind a [`RwLock`], so all trait methods operate
/// on `&self`. Uploaded [`Headers`] are recorded and can be inspected with
/// [`headers()`](Self::headers).
///
/// # Examples
///
/// ```
/// use probeinfo_storage::{Headers, backend::{MockBackend, StorageBackend}};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([("glean/fenix/metrics", b"{}")]);
/// assert!(backend.exists(Path::new("glean/fenix/metrics")).await?);
///
/// backend.write(Path::new("general"), b"{}", &Headers::default()).await?;
/// assert_eq!(backend.keys().await.len(), 2);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    storage: RwLock<BTreeMap<PathBuf, StoredObject>>,
}

impl MockBackend {
    /// Create a mock backend pre-populated with objects.
    ///
    /// Panics if any path fails validation: broken test setup should not
    /// produce a passing test.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = BTreeMap::new();
        let now = OffsetDateTime::now_utc();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                panic!("MockBackend::with_files: invalid path {}", path.display());
            };
            let object = StoredObject {
                modified: now,
                data: data.into(),
                headers: Headers::default(),
            };
            map.insert(validated, object);
        }
        Self {
            name: "mock".to_string(),
            storage: RwLock::new(map),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Every stored key, sorted.
    pub async fn keys(&self) -> Vec<PathBuf> {
        self.storage.read().await.keys().cloned().collect()
    }

    /// Headers the object at `path` was last written with.
    pub async fn headers(&self, path: impl AsRef<Path>) -> Option<Headers> {
        self.storage.read().await.get(path.as_ref()).map(|object| object.headers.clone())
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };

        Box::pin(stream! {
            // Snapshot under the read lock; never hold it across a yield.
            let entries: Vec<FileInfo> = {
                let guard = self.storage.read().await;
                guard
                    .iter()
                    .filter(|(path, _)| validated_prefix.as_ref().is_none_or(|pfx| path.starts_with(pfx)))
                    .map(|(path, object)| FileInfo::new(path.clone(), object.data.len() as u64, object.modified))
                    .collect()
            };
            for info in entries {
                yield Ok(info);
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        Ok(self.storage.read().await.contains_key(&path))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let path = validate_path(path)?;
        let guard = self.storage.read().await;
        let object = guard.get(&path).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path.clone())))?;
        Ok(object.data.clone())
    }

    async fn write(&self, path: &Path, data: &[u8], headers: &Headers) -> Result<()> {
        let path = validate_path(path)?;
        let object = StoredObject {
            modified: OffsetDateTime::now_utc(),
            data: data.to_vec(),
            headers: headers.clone(),
        };
        self.storage.write().await.insert(path, object);
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let path = validate_path(path)?;
        self.storage.write().await.remove(&path).map(|_| ()).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let path = validate_path(path)?;
        let guard = self.storage.read().await;
        let object = guard.get(&path).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path.clone())))?;
        Ok(FileInfo::new(path.clone(), object.data.len() as u64, object.modified))
    }
}
