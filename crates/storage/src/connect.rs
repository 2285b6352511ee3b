//! Scheme → backend dispatch.

use crate::BackendHandle;
use crate::backend::LocalBackend;
#[cfg(feature = "gcs")]
use crate::backend::GcsBackend;
#[cfg(feature = "s3")]
use crate::backend::{S3Backend, S3Options};
use crate::error::{ErrorKind, Result};
use crate::location::{RemoteLocation, Scheme};
use async_trait::async_trait;
use std::collections::HashMap;
#[cfg(feature = "gcs")]
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Resolves a remote location to the backend serving its bucket.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, location: &RemoteLocation) -> Result<BackendHandle>;
}

/// Connects to real object stores, reusing one client per bucket.
#[derive(Default)]
pub struct DefaultConnector {
    #[cfg(feature = "s3")]
    s3: S3Options,
    #[cfg(feature = "gcs")]
    gcs_service_account: Option<PathBuf>,
    clients: Mutex<HashMap<(Scheme, String), BackendHandle>>,
}

impl DefaultConnector {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(feature = "s3")]
    pub fn with_s3(mut self, options: S3Options) -> Self {
        self.s3 = options;
        self
    }

    #[cfg(feature = "gcs")]
    pub fn with_gcs_service_account(mut self, path: Option<PathBuf>) -> Self {
        self.gcs_service_account = path;
        self
    }

    fn build(&self, location: &RemoteLocation) -> Result<BackendHandle> {
        let name = location.to_string();
        match location.scheme() {
            Scheme::Local => Ok(Arc::new(LocalBackend::new(name, "/")?)),
            #[cfg(feature = "s3")]
            Scheme::S3 => Ok(Arc::new(S3Backend::new(name, location.bucket(), &self.s3)?)),
            #[cfg(feature = "gcs")]
            Scheme::Gcs => Ok(Arc::new(GcsBackend::new(name, location.bucket(), self.gcs_service_account.as_deref())?)),
            #[allow(unreachable_patterns)]
            scheme => exn::bail!(ErrorKind::UnsupportedScheme(format!("{scheme} (not compiled in)"))),
        }
    }
}

#[async_trait]
impl Connector for DefaultConnector {
    async fn connect(&self, location: &RemoteLocation) -> Result<BackendHandle> {
        let mut clients = self.clients.lock().await;
        let cache_key = (location.scheme(), location.bucket().to_string());
        if let Some(handle) = clients.get(&cache_key) {
            return Ok(handle.clone());
        }
        let handle = self.build(location)?;
        tracing::debug!(scheme = %location.scheme(), bucket = location.bucket(), "connected storage backend");
        clients.insert(cache_key, handle.clone());
        Ok(handle)
    }
}

/// Serves pre-built backends by bucket name, regardless of scheme. Used to
/// point runs at in-memory backends.
#[derive(Default, Clone)]
pub struct StaticConnector {
    buckets: HashMap<String, BackendHandle>,
}

impl StaticConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>, backend: BackendHandle) -> Self {
        self.buckets.insert(bucket.into(), backend);
        self
    }
}

#[async_trait]
impl Connector for StaticConnector {
    async fn connect(&self, location: &RemoteLocation) -> Result<BackendHandle> {
        match self.buckets.get(location.bucket()) {
            Some(handle) => Ok(handle.clone()),
            None => exn::bail!(ErrorKind::BackendError(format!("no backend registered for {location}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageBackend;

    #[tokio::test]
    async fn local_locations_connect_without_configuration() {
        let connector = DefaultConnector::new();
        let location = RemoteLocation::parse("file:///tmp").unwrap();
        let backend = connector.connect(&location).await.unwrap();
        assert_eq!(backend.name(), "file:///tmp");
        // Cached per bucket
        let again = connector.connect(&RemoteLocation::parse("file:///var").unwrap()).await.unwrap();
        assert!(Arc::ptr_eq(&backend, &again));
    }

    #[cfg(feature = "s3")]
    #[tokio::test]
    async fn s3_without_credentials_is_a_configuration_error() {
        let connector = DefaultConnector::new();
        let location = RemoteLocation::parse("s3://bucket/prefix").unwrap();
        let err = connector.connect(&location).await.err().unwrap();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn static_connector_unknown_bucket() {
        let connector = StaticConnector::new();
        let location = RemoteLocation::parse("s3://unknown").unwrap();
        assert!(connector.connect(&location).await.is_err());
    }
}
