//! Remote locations.
//!
//! A remote location is `<scheme>://<bucket>[/<prefix>]`. The scheme alone
//! picks the backend; the prefix is the root of the tree being synced.

use crate::error::{Error, ErrorKind, Result};
use crate::path::validate as validate_path;
use derive_more::Display;
use std::fmt::{Display as FmtDisplay, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Object store families a location can point at.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum Scheme {
    #[display("s3")]
    S3,
    #[display("gs")]
    Gcs,
    /// A directory on the local filesystem, mirrored like a bucket.
    #[display("file")]
    Local,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RemoteLocation {
    scheme: Scheme,
    bucket: String,
    prefix: Option<PathBuf>,
}

impl RemoteLocation {
    /// Parse a remote location URL.
    ///
    /// ```
    /// use std::path::Path;
    /// use probeinfo_storage::{RemoteLocation, Scheme};
    ///
    /// let cache: RemoteLocation = "s3://telemetry-airflow-cache/cache/probe-scraper".parse().unwrap();
    /// assert_eq!(cache.scheme(), Scheme::S3);
    /// assert_eq!(cache.bucket(), "telemetry-airflow-cache");
    /// assert_eq!(cache.prefix(), Some(Path::new("cache/probe-scraper")));
    ///
    /// assert!("ftp://example.com/probes".parse::<RemoteLocation>().is_err());
    /// ```
    pub fn parse(url: &str) -> Result<Self> {
        let Some((scheme, rest)) = url.split_once("://") else {
            exn::bail!(ErrorKind::InvalidLocation(url.to_string()));
        };
        let scheme = match scheme {
            "s3" => Scheme::S3,
            "gs" => Scheme::Gcs,
            "file" => Scheme::Local,
            other => exn::bail!(ErrorKind::UnsupportedScheme(other.to_string())),
        };
        if scheme == Scheme::Local {
            if !rest.starts_with('/') {
                exn::bail!(ErrorKind::InvalidLocation(url.to_string()));
            }
            return Ok(Self {
                scheme,
                bucket: String::new(),
                prefix: Self::parse_prefix(url, rest)?,
            });
        }
        let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            exn::bail!(ErrorKind::InvalidLocation(url.to_string()));
        }
        Ok(Self {
            scheme,
            bucket: bucket.to_string(),
            prefix: Self::parse_prefix(url, prefix)?,
        })
    }

    fn parse_prefix(url: &str, prefix: &str) -> Result<Option<PathBuf>> {
        if prefix.trim_matches('/').is_empty() {
            return Ok(None);
        }
        let validated = validate_path(prefix).map_err(|e| e.raise(ErrorKind::InvalidLocation(url.to_string())))?;
        Ok(Some(validated))
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Bucket name. Empty for local locations, whose keys are relative to
    /// the filesystem root.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn prefix(&self) -> Option<&Path> {
        self.prefix.as_deref()
    }

    /// The location of `relative` underneath this one.
    ///
    /// ```
    /// use probeinfo_storage::RemoteLocation;
    ///
    /// let output = RemoteLocation::parse("gs://probe-info").unwrap();
    /// assert_eq!(output.join("glean/fenix").unwrap().to_string(), "gs://probe-info/glean/fenix");
    /// ```
    pub fn join(&self, relative: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            scheme: self.scheme,
            bucket: self.bucket.clone(),
            prefix: Some(self.key_for(relative)?),
        })
    }

    /// Full object key for a path relative to this location.
    pub fn key_for(&self, relative: impl AsRef<Path>) -> Result<PathBuf> {
        match &self.prefix {
            Some(prefix) => validate_path(prefix.join(validate_path(relative)?)),
            None => validate_path(relative),
        }
    }

    /// Path of `key` relative to this location, or `None` if the key lies
    /// outside it. A key equal to the prefix itself (a single-object
    /// location) resolves to its file name.
    pub fn relative<'a>(&self, key: &'a Path) -> Option<&'a Path> {
        let Some(prefix) = &self.prefix else {
            return Some(key);
        };
        match key.strip_prefix(prefix) {
            Ok(rest) if rest.as_os_str().is_empty() => key.file_name().map(Path::new),
            Ok(rest) => Some(rest),
            Err(_) => None,
        }
    }
}

impl FromStr for RemoteLocation {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl FmtDisplay for RemoteLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let prefix = self.prefix.as_deref().map(Path::to_string_lossy).unwrap_or_default();
        match (self.scheme, prefix.is_empty()) {
            (Scheme::Local, _) => write!(f, "file:///{prefix}"),
            (_, true) => write!(f, "{}://{}", self.scheme, self.bucket),
            (_, false) => write!(f, "{}://{}/{prefix}", self.scheme, self.bucket),
        }
    }
}
