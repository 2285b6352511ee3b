//! Pull and push of whole trees between a local directory and a remote
//! location.
//!
//! Pushing never deletes an object it was not responsible for: only keys
//! under the destination that were not part of the upload and do not match
//! the exclude pattern are removed.

use crate::backend::StorageBackend;
use crate::connect::Connector;
use crate::error::{Error, ErrorKind, Result};
use crate::location::RemoteLocation;
use crate::models::Headers;
use crate::pattern::ExcludePattern;
use crate::path::validate as validate_path;
use exn::ResultExt;
use futures::{StreamExt, TryStreamExt, stream};
use probeinfo_compress::Compression;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::ops::AddAssign;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::instrument;
use walkdir::WalkDir;

const TRANSFER_CONCURRENCY: usize = 16;
const INDEX_HTML: &str = "index.html";

/// Options for [`RemoteStorage::push`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PushOptions {
    /// Gzip every file and upload with published-document headers.
    pub compress: bool,
    /// Remove remote objects under the destination that were not uploaded.
    pub delete: bool,
    /// Paths (relative to the sync root) to skip on both sides.
    pub exclude: Option<String>,
}
impl PushOptions {
    pub fn compressed() -> Self {
        Self {
            compress: true,
            ..Self::default()
        }
    }

    pub fn with_delete(mut self, delete: bool) -> Self {
        self.delete = delete;
        self
    }

    pub fn with_exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude = Some(pattern.into());
        self
    }
}

/// What a push changed remotely.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub uploaded: usize,
    pub deleted: usize,
}
impl AddAssign for SyncReport {
    fn add_assign(&mut self, other: Self) {
        self.uploaded += other.uploaded;
        self.deleted += other.deleted;
    }
}

struct Mirror<'a> {
    backend: &'a dyn StorageBackend,
    destination: &'a RemoteLocation,
    /// Attach published-document headers for this encoding.
    published: Option<Compression>,
    delete: bool,
    exclude: Option<&'a ExcludePattern>,
}

/// Synchronises local trees with remote locations, resolving each location
/// to a backend through a [`Connector`].
#[derive(Clone)]
pub struct RemoteStorage {
    connector: Arc<dyn Connector>,
}

impl RemoteStorage {
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self {
            connector: Arc::new(connector),
        }
    }

    /// Copy every object under `source` into `destination`, preserving the
    /// relative layout. With `decompress`, objects are first pulled into a
    /// scratch directory and then inflated into `destination`; objects that
    /// are not gzipped are copied verbatim. Returns the number of objects
    /// fetched.
    #[instrument(skip(self), fields(source = %source, destination = %destination.display()))]
    pub async fn pull(&self, source: &RemoteLocation, destination: &Path, decompress: bool) -> Result<usize> {
        let backend = self.connector.connect(source).await?;
        if !decompress {
            return Self::download(&*backend, source, destination).await;
        }
        let scratch = tempfile::tempdir().map_err(ErrorKind::Io)?;
        let tree = scratch.path().join("tree");
        let count = Self::download(&*backend, source, &tree).await?;
        let target = destination.to_path_buf();
        tokio::task::spawn_blocking(move || inflate_tree(&tree, &target))
            .await
            .or_raise(|| ErrorKind::BackendError("decompression task failed".to_string()))??;
        tracing::info!(objects = count, "pulled");
        Ok(count)
    }

    async fn download(backend: &dyn StorageBackend, source: &RemoteLocation, root: &Path) -> Result<usize> {
        tokio::fs::create_dir_all(root).await.map_err(ErrorKind::Io)?;
        let listing = backend.list(source.prefix()).await?;
        let count = listing.len();
        stream::iter(listing)
            .map(Ok::<_, Error>)
            .try_for_each_concurrent(TRANSFER_CONCURRENCY, |info| async move {
                let Some(relative) = source.relative(&info.path) else {
                    return Ok(());
                };
                let target = root.join(validate_path(relative)?);
                let data = backend.read(&info.path).await?;
                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent).await.map_err(ErrorKind::Io)?;
                }
                tokio::fs::write(&target, data).await.map_err(ErrorKind::Io)?;
                tracing::trace!(key = %info.path.display(), "downloaded");
                Ok(())
            })
            .await?;
        Ok(count)
    }

    /// Mirror the file or directory at `source` into `destination`.
    ///
    /// A single file is uploaded to the destination key itself. With
    /// `compress`, every file is gzipped into a scratch tree first and
    /// uploaded with `Content-Encoding: gzip`, a cache lifetime and public
    /// read access; a root-level `index.html` is uploaded on its own (as
    /// `text/html`) and is never deleted by the bulk pass. Compression cannot
    /// be combined with an exclude pattern.
    #[instrument(skip(self, options), fields(source = %source.display(), destination = %destination))]
    pub async fn push(&self, source: &Path, destination: &RemoteLocation, options: &PushOptions) -> Result<SyncReport> {
        if options.compress && options.exclude.is_some() {
            exn::bail!(ErrorKind::Unsupported("exclude patterns cannot be combined with compression"));
        }
        let exclude = options.exclude.as_deref().map(ExcludePattern::new).transpose()?;
        let metadata = tokio::fs::metadata(source).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(source.to_path_buf()),
            _ => ErrorKind::Io(e),
        })?;
        let backend = self.connector.connect(destination).await?;
        let mut mirror = Mirror {
            backend: &*backend,
            destination,
            published: None,
            delete: options.delete,
            exclude: exclude.as_ref(),
        };

        let report = if !options.compress {
            mirror.run(source, metadata.is_dir()).await?
        } else if metadata.is_file() {
            let scratch = tempfile::tempdir().map_err(ErrorKind::Io)?;
            let name = source.file_name().ok_or_else(|| exn::Exn::from(ErrorKind::InvalidPath(source.to_path_buf())))?;
            let packed = scratch.path().join(name);
            let (from, to) = (source.to_path_buf(), packed.clone());
            tokio::task::spawn_blocking(move || Compression::Gzip.compress_file(&from, &to))
                .await
                .or_raise(|| ErrorKind::BackendError("compression task failed".to_string()))?
                .map_err(ErrorKind::compression)?;
            mirror.published = Some(Compression::Gzip);
            mirror.run(&packed, false).await?
        } else {
            let scratch = tempfile::tempdir().map_err(ErrorKind::Io)?;
            let tree = scratch.path().join("tree");
            let (from, to) = (source.to_path_buf(), tree.clone());
            tokio::task::spawn_blocking(move || deflate_tree(&from, &to))
                .await
                .or_raise(|| ErrorKind::BackendError("compression task failed".to_string()))??;
            mirror.published = Some(Compression::Gzip);

            let mut report = SyncReport::default();
            let index = tree.join(INDEX_HTML);
            if tokio::fs::try_exists(&index).await.map_err(ErrorKind::Io)? {
                let index_location = destination.join(INDEX_HTML)?;
                let index_mirror = Mirror {
                    destination: &index_location,
                    delete: false,
                    ..mirror
                };
                report += index_mirror.run(&index, false).await?;
            }
            let rest = ExcludePattern::new(INDEX_HTML)?;
            mirror.exclude = Some(&rest);
            report += mirror.run(&tree, true).await?;
            report
        };
        tracing::info!(uploaded = report.uploaded, deleted = report.deleted, "pushed");
        Ok(report)
    }
}

impl Mirror<'_> {
    async fn run(&self, source: &Path, is_dir: bool) -> Result<SyncReport> {
        let files = if is_dir {
            let (root, exclude) = (source.to_path_buf(), self.exclude.cloned());
            tokio::task::spawn_blocking(move || collect_files(&root, exclude.as_ref()))
                .await
                .or_raise(|| ErrorKind::BackendError("directory walk failed".to_string()))??
        } else {
            let name = source.file_name().map(PathBuf::from);
            let relative = name.ok_or_else(|| exn::Exn::from(ErrorKind::InvalidPath(source.to_path_buf())))?;
            match self.exclude {
                Some(exclude) if exclude.matches(&relative, false) => Vec::new(),
                _ => vec![(source.to_path_buf(), relative)],
            }
        };

        let mut uploads = Vec::with_capacity(files.len());
        for (absolute, relative) in files {
            let key = match (is_dir, self.destination.prefix()) {
                (false, Some(prefix)) => prefix.to_path_buf(),
                _ => self.destination.key_for(&relative)?,
            };
            let headers = match self.published {
                Some(compression) => Headers::published(&relative.to_string_lossy(), compression),
                None => Headers::default(),
            };
            uploads.push((absolute, key, headers));
        }
        let keep: HashSet<PathBuf> = uploads.iter().map(|(_, key, _)| key.clone()).collect();

        let backend = self.backend;
        stream::iter(uploads)
            .map(Ok::<_, Error>)
            .try_for_each_concurrent(TRANSFER_CONCURRENCY, |(absolute, key, headers)| async move {
                let data = tokio::fs::read(&absolute).await.map_err(ErrorKind::Io)?;
                backend.write(&key, &data, &headers).await?;
                tracing::trace!(key = %key.display(), size = data.len(), "uploaded");
                Ok(())
            })
            .await?;

        let mut report = SyncReport {
            uploaded: keep.len(),
            deleted: 0,
        };
        if self.delete {
            for info in backend.list(self.destination.prefix()).await? {
                if keep.contains(&info.path) {
                    continue;
                }
                let Some(relative) = self.destination.relative(&info.path) else {
                    continue;
                };
                if self.exclude.is_some_and(|exclude| exclude.matches(relative, false)) {
                    tracing::trace!(key = %info.path.display(), "kept excluded object");
                    continue;
                }
                backend.delete(&info.path).await?;
                tracing::debug!(key = %info.path.display(), "deleted stale object");
                report.deleted += 1;
            }
        }
        Ok(report)
    }
}

/// Regular files under `root` as `(absolute, relative)` pairs, pruning
/// excluded directories before descending into them.
fn collect_files(root: &Path, exclude: Option<&ExcludePattern>) -> Result<Vec<(PathBuf, PathBuf)>> {
    let walker = WalkDir::new(root).min_depth(1).follow_links(true).sort_by_file_name();
    let entries = walker.into_iter().filter_entry(|entry| {
        let Ok(relative) = entry.path().strip_prefix(root) else {
            return true;
        };
        !exclude.is_some_and(|exclude| exclude.matches(relative, entry.file_type().is_dir()))
    });
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ErrorKind::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).or_raise(|| ErrorKind::InvalidPath(entry.path().to_path_buf()))?;
        files.push((entry.path().to_path_buf(), relative.to_path_buf()));
    }
    Ok(files)
}

/// Gzip every file under `source` into the same layout under `target`.
fn deflate_tree(source: &Path, target: &Path) -> Result<()> {
    std::fs::create_dir_all(target).map_err(ErrorKind::Io)?;
    for (absolute, relative) in collect_files(source, None)? {
        Compression::Gzip.compress_file(&absolute, &target.join(relative)).map_err(ErrorKind::compression)?;
    }
    Ok(())
}

/// Recreate `source` under `target`, inflating gzipped files. Whatever is
/// in the way of an incoming entry is replaced: a file where a directory
/// belongs is removed, and so is a directory where a file belongs.
fn inflate_tree(source: &Path, target: &Path) -> Result<()> {
    std::fs::create_dir_all(target).map_err(ErrorKind::Io)?;
    for entry in WalkDir::new(source).min_depth(1) {
        let entry = entry.map_err(|e| ErrorKind::Io(e.into()))?;
        let relative = entry.path().strip_prefix(source).or_raise(|| ErrorKind::InvalidPath(entry.path().to_path_buf()))?;
        let destination = target.join(relative);
        if entry.file_type().is_dir() {
            if destination.exists() && !destination.is_dir() {
                std::fs::remove_file(&destination).map_err(ErrorKind::Io)?;
            }
            std::fs::create_dir_all(&destination).map_err(ErrorKind::Io)?;
            continue;
        }
        if destination.is_dir() {
            tracing::warn!(path = %destination.display(), "replacing directory with pulled file");
            std::fs::remove_dir_all(&destination).map_err(ErrorKind::Io)?;
        }
        let format = sniff(entry.path())?;
        format.decompress_file(entry.path(), &destination).map_err(ErrorKind::compression)?;
    }
    Ok(())
}

fn sniff(path: &Path) -> Result<Compression> {
    let mut head = Vec::with_capacity(2);
    let file = File::open(path).map_err(ErrorKind::Io)?;
    file.take(2).read_to_end(&mut head).map_err(ErrorKind::Io)?;
    Ok(Compression::from_magic_bytes(&head))
}
