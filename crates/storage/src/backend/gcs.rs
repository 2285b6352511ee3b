//! Google Cloud Storage backend, via `object_store`.

use crate::backend::FileInfoStream;
use crate::error::{ErrorKind, Result};
use crate::models::{FileInfo, Headers};
use crate::{StorageBackend, validate_path};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use futures::StreamExt;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, AttributeValue, Attributes, ObjectMeta, ObjectStore, PutOptions, PutPayload, RetryConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;

/// GCS storage backend for a single bucket.
///
/// Credentials come from the environment (`GOOGLE_APPLICATION_CREDENTIALS`
/// and friends) unless a service account file is given. Canned ACLs are not
/// applied; publicly served buckets are expected to grant read access at the
/// bucket level.
#[derive(Debug, Clone)]
pub struct GcsBackend {
    name: String,
    bucket: String,
    store: Arc<dyn ObjectStore>,
}

impl GcsBackend {
    pub fn new(name: impl Into<String>, bucket: impl Into<String>, service_account_path: Option<&Path>) -> Result<Self> {
        let bucket = bucket.into();
        let mut builder = GoogleCloudStorageBuilder::from_env()
            .with_bucket_name(&bucket)
            .with_retry(RetryConfig::default());
        if let Some(path) = service_account_path {
            builder = builder.with_service_account_path(path.to_string_lossy());
        }
        let store = builder.build().or_raise(|| ErrorKind::Credentials(format!("gs://{bucket}")))?;
        Ok(Self {
            name: name.into(),
            bucket,
            store: Arc::new(store),
        })
    }

    fn key(path: &Path) -> Result<ObjectPath> {
        let validated = validate_path(path)?;
        let key = validated.to_str().ok_or_raise(|| ErrorKind::InvalidPath(validated.clone()))?;
        ObjectPath::parse(key).or_raise(|| ErrorKind::InvalidPath(validated.clone()))
    }

    fn file_info(meta: ObjectMeta) -> Result<FileInfo> {
        let modified = OffsetDateTime::from_unix_timestamp(meta.last_modified.timestamp())
            .or_raise(|| ErrorKind::BackendError("GCS datetime out of range".to_string()))?;
        Ok(FileInfo::new(PathBuf::from(meta.location.as_ref()), meta.size, modified))
    }

    fn map_error(err: object_store::Error, path: &Path) -> ErrorKind {
        match err {
            object_store::Error::NotFound { .. } => ErrorKind::NotFound(path.to_path_buf()),
            object_store::Error::PermissionDenied { .. } | object_store::Error::Unauthenticated { .. } => {
                ErrorKind::PermissionDenied(path.to_path_buf())
            },
            other => ErrorKind::Network(other.to_string()),
        }
    }

    fn attributes(headers: &Headers) -> Attributes {
        let pairs = [
            (Attribute::ContentType, &headers.content_type),
            (Attribute::ContentEncoding, &headers.content_encoding),
            (Attribute::CacheControl, &headers.cache_control),
        ];
        pairs
            .into_iter()
            .filter_map(|(attribute, value)| value.clone().map(|value| (attribute, AttributeValue::from(value))))
            .collect()
    }
}

#[async_trait]
impl StorageBackend for GcsBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let prefix = match prefix.map(Self::key).transpose() {
            Ok(prefix) => prefix,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };
        // `ObjectStore::list` already matches prefixes by path segment.
        let listing = self.store.list(prefix.as_ref()).map(|meta| match meta {
            Ok(meta) => Self::file_info(meta),
            Err(err) => Err(exn::Exn::from(ErrorKind::Network(err.to_string()))),
        });
        Box::pin(listing)
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let key = Self::key(path)?;
        match self.store.head(&key).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(err) => Err(Self::map_error(err, path).into()),
        }
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let key = Self::key(path)?;
        let result = self.store.get(&key).await.map_err(|e| Self::map_error(e, path))?;
        let bytes = result.bytes().await.map_err(|e| Self::map_error(e, path))?;
        Ok(bytes.to_vec())
    }

    async fn write(&self, path: &Path, data: &[u8], headers: &Headers) -> Result<()> {
        let key = Self::key(path)?;
        let options = PutOptions {
            attributes: Self::attributes(headers),
            ..Default::default()
        };
        if headers.public_read {
            tracing::trace!(bucket = %self.bucket, %key, "canned ACLs are not applied on GCS");
        }
        self.store
            .put_opts(&key, PutPayload::from(data.to_vec()), options)
            .await
            .map_err(|e| Self::map_error(e, path))?;
        tracing::debug!(bucket = %self.bucket, %key, size = data.len(), "uploaded object");
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let key = Self::key(path)?;
        self.store.delete(&key).await.map_err(|e| Self::map_error(e, path))?;
        tracing::debug!(bucket = %self.bucket, %key, "deleted object");
        Ok(())
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let key = Self::key(path)?;
        let meta = self.store.head(&key).await.map_err(|e| Self::map_error(e, path))?;
        Self::file_info(meta)
    }
}
