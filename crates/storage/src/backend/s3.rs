//! S3 storage backend.
//!
//! # Credentials
//!
//! Credentials are provided explicitly (see [`S3Options`]); the AWS SDK's
//! default provider chain is not consulted.

use crate::backend::FileInfoStream;
use crate::error::{ErrorKind, Result};
use crate::models::{FileInfo, Headers};
use crate::{StorageBackend, validate_path};
use async_stream::stream;
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, retry::RetryConfig},
    error::DisplayErrorContext,
    primitives::{ByteStream, DateTime},
    types::ObjectCannedAcl,
};
use exn::{OptionExt, ResultExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

const DEFAULT_CONCURRENT_REQUESTS: usize = 32;

/// Connection settings shared by every S3 bucket a run touches.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct S3Options {
    pub region: String,
    /// Custom endpoint for S3-compatible services and local testing.
    pub endpoint: Option<String>,
    pub key_id: Option<String>,
    pub key_secret: Option<String>,
}

/// S3 storage backend for a single bucket.
///
/// # Examples
///
/// ```no_run
/// use probeinfo_storage::backend::{S3Backend, S3Options};
///
/// let options = S3Options {
///     region: "us-west-2".to_string(),
///     endpoint: None,
///     key_id: Some("access_key_id".to_string()),
///     key_secret: Some("secret_access_key".to_string()),
/// };
/// let backend = S3Backend::new("output", "net-mozaws-prod-us-west-2-data-pitmo", &options).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct S3Backend {
    name: String,
    client: Client,
    bucket: String,
    rate_limiter: Arc<Semaphore>,
}

impl S3Backend {
    pub fn new(name: impl Into<String>, bucket: impl Into<String>, options: &S3Options) -> Result<Self> {
        let (Some(key_id), Some(key_secret)) = (&options.key_id, &options.key_secret) else {
            exn::bail!(ErrorKind::Credentials("s3".to_string()));
        };
        let credentials = Credentials::new(key_id, key_secret, None, None, "probeinfo-config");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(options.region.clone()))
            // 1 initial attempt + 3 retries, with exponential backoff
            .retry_config(RetryConfig::standard().with_max_attempts(4));
        if let Some(endpoint_url) = &options.endpoint {
            // Path-style addressing for S3-compatible endpoints.
            config_builder = config_builder.endpoint_url(endpoint_url).force_path_style(true);
        }
        Ok(Self {
            name: name.into(),
            client: Client::from_conf(config_builder.build()),
            bucket: bucket.into(),
            rate_limiter: Arc::new(Semaphore::new(DEFAULT_CONCURRENT_REQUESTS)),
        })
    }

    fn key(path: &Path) -> Result<String> {
        let validated = validate_path(path)?;
        validated.to_str().map(str::to_string).ok_or_raise(|| ErrorKind::InvalidPath(validated.clone()))
    }

    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        self.rate_limiter
            .clone()
            .acquire_owned()
            .await
            .or_raise(|| ErrorKind::BackendError("S3 rate limiter closed".to_string()))
    }

    fn parse_datetime(dt: Option<&DateTime>) -> Result<OffsetDateTime> {
        let Some(dt) = dt else {
            return Ok(OffsetDateTime::UNIX_EPOCH);
        };
        OffsetDateTime::from_unix_timestamp_nanos(dt.as_nanos())
            .or_raise(|| ErrorKind::BackendError("S3 datetime out of range".to_string()))
    }

    fn network_error<E: std::error::Error + 'static>(err: E) -> ErrorKind {
        ErrorKind::Network(DisplayErrorContext(err).to_string())
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let (validated_prefix, key_prefix) = match prefix.map(|p| Self::key(p).map(|k| (PathBuf::from(&k), k))).transpose()
        {
            Ok(Some((path, key))) => (Some(path), Some(key)),
            Ok(None) => (None, None),
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };

        Box::pin(stream! {
            let _permit = match self.acquire_permit().await {
                Ok(permit) => permit,
                Err(e) => { yield Err(e); return; },
            };
            let mut pages = self.client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_prefix(key_prefix)
                .into_paginator()
                .send();
            while let Some(page) = pages.next().await {
                let page = match page {
                    Ok(page) => page,
                    Err(e) => { yield Err(exn::Exn::from(Self::network_error(e))); return; },
                };
                for object in page.contents() {
                    let Some(key) = object.key() else { continue };
                    // Folder placeholder objects
                    if key.ends_with('/') {
                        continue;
                    }
                    let path = PathBuf::from(key);
                    // S3 prefixes are plain string prefixes.
                    if validated_prefix.as_ref().is_some_and(|pfx| !path.starts_with(pfx)) {
                        continue;
                    }
                    let size = object.size().unwrap_or_default().max(0) as u64;
                    match Self::parse_datetime(object.last_modified()) {
                        Ok(modified) => yield Ok(FileInfo::new(path, size, modified)),
                        Err(e) => yield Err(e),
                    }
                }
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let key = Self::key(path)?;
        let _permit = self.acquire_permit().await?;
        match self.client.head_object().bucket(&self.bucket).key(&key).send().await {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(err) => Err(Self::network_error(err).into()),
        }
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let key = Self::key(path)?;
        let _permit = self.acquire_permit().await?;
        let output = match self.client.get_object().bucket(&self.bucket).key(&key).send().await {
            Ok(output) => output,
            Err(err) if err.as_service_error().is_some_and(|e| e.is_no_such_key()) => {
                exn::bail!(ErrorKind::NotFound(path.to_path_buf()))
            },
            Err(err) => exn::bail!(Self::network_error(err)),
        };
        let body = output.body.collect().await.map_err(Self::network_error)?;
        Ok(body.into_bytes().to_vec())
    }

    async fn write(&self, path: &Path, data: &[u8], headers: &Headers) -> Result<()> {
        let key = Self::key(path)?;
        let _permit = self.acquire_permit().await?;
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data.to_vec()))
            .set_content_type(headers.content_type.clone())
            .set_content_encoding(headers.content_encoding.clone())
            .set_cache_control(headers.cache_control.clone());
        if headers.public_read {
            request = request.acl(ObjectCannedAcl::PublicRead);
        }
        request.send().await.map_err(Self::network_error)?;
        tracing::debug!(bucket = %self.bucket, %key, size = data.len(), "uploaded object");
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let key = Self::key(path)?;
        let _permit = self.acquire_permit().await?;
        self.client.delete_object().bucket(&self.bucket).key(&key).send().await.map_err(Self::network_error)?;
        tracing::debug!(bucket = %self.bucket, %key, "deleted object");
        Ok(())
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let key = Self::key(path)?;
        let _permit = self.acquire_permit().await?;
        let output = match self.client.head_object().bucket(&self.bucket).key(&key).send().await {
            Ok(output) => output,
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => {
                exn::bail!(ErrorKind::NotFound(path.to_path_buf()))
            },
            Err(err) => exn::bail!(Self::network_error(err)),
        };
        let size = output.content_length().unwrap_or_default().max(0) as u64;
        let modified = Self::parse_datetime(output.last_modified())?;
        Ok(FileInfo::new(PathBuf::from(key), size, modified))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> S3Options {
        S3Options {
            region: "us-west-2".to_string(),
            endpoint: Some("http://localhost:9000".to_string()),
            key_id: Some("key".to_string()),
            key_secret: Some("secret".to_string()),
        }
    }

    #[test]
    fn test_new_requires_credentials() {
        let options = S3Options {
            key_secret: None,
            ..options()
        };
        let err = S3Backend::new("output", "bucket", &options).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Credentials(_)));
        assert!(S3Backend::new("output", "bucket", &self::options()).is_ok());
    }

    #[test]
    fn test_key_is_normalised() {
        assert_eq!(S3Backend::key(Path::new("glean//fenix/./metrics")).unwrap(), "glean/fenix/metrics");
        assert!(S3Backend::key(Path::new("../escape")).is_err());
    }

    #[test]
    fn test_parse_datetime() {
        assert_eq!(S3Backend::parse_datetime(None).unwrap(), OffsetDateTime::UNIX_EPOCH);
        let dt = DateTime::from_secs(1_704_067_200);
        assert_eq!(S3Backend::parse_datetime(Some(&dt)).unwrap().unix_timestamp(), 1_704_067_200);
    }
}
