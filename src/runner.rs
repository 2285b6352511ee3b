//! Run orchestration: mode validation, the moz-central and Glean flows, and
//! publication.

use crate::cli::Cli;
use crate::error::{ErrorKind, Result};
use crate::history::{self, VersionFilter};
use crate::output::{self, GLEAN};
use exn::ResultExt;
use probeinfo_config::Config;
use probeinfo_glean::error::{Error as GleanError, ErrorKind as GleanErrorKind};
use probeinfo_glean::{
    DefinitionParsers, ErrorMode, NotificationQueue, Notifier, Reconciler, RepoState, Repositories, Selection, checks,
};
use probeinfo_registry::{ParserSet, RevisionTransformer};
use probeinfo_storage::{PushOptions, RemoteLocation, RemoteStorage, SyncReport};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use time::{OffsetDateTime, PrimitiveDateTime};
use tracing::instrument;
use walkdir::WalkDir;

const CACHE_EXCLUDE: &str = "*.git/*";

/// Everything a run needs to know besides configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunOptions {
    pub cache_dir: PathBuf,
    pub out_dir: PathBuf,
    pub repositories_file: PathBuf,
    pub revisions_manifest: PathBuf,
    pub commits_manifest: PathBuf,
    pub dry_run: bool,
    pub glean_repos: Vec<String>,
    pub glean_repo_url: Option<String>,
    pub firefox_channel: Option<String>,
    pub versions: VersionFilter,
    pub moz_central: bool,
    pub glean: bool,
    pub update: bool,
    pub commit: Option<String>,
    pub branch: Option<String>,
}

impl From<&Cli> for RunOptions {
    fn from(cli: &Cli) -> Self {
        let both = !cli.moz_central && !cli.glean;
        Self {
            cache_dir: cli.cache_dir.clone(),
            out_dir: cli.out_dir.clone(),
            repositories_file: cli.repositories_file.clone(),
            revisions_manifest: cli.revisions.clone().unwrap_or_else(|| cli.cache_dir.join("moz-central/revisions.json")),
            commits_manifest: cli.commits.clone().unwrap_or_else(|| cli.cache_dir.join("glean/commits.json")),
            dry_run: cli.dry_run,
            glean_repos: cli.glean_repos.clone(),
            glean_repo_url: cli.glean_repo_url.clone(),
            firefox_channel: cli.firefox_channel.clone(),
            versions: VersionFilter::new(cli.firefox_version, cli.min_firefox_version),
            moz_central: cli.moz_central || both,
            glean: cli.glean || both,
            update: cli.update,
            commit: cli.commit.clone(),
            branch: cli.branch.clone(),
        }
    }
}

impl RunOptions {
    /// A single pushed commit or branch, validated synchronously.
    pub fn single_commit(&self) -> bool {
        self.update && (self.commit.is_some() || self.branch.is_some())
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| exn::Exn::from(ErrorKind::Configuration(message.to_string()));
        if (self.commit.is_some() || self.branch.is_some()) && !self.update {
            return Err(invalid("--commit and --branch require --update"));
        }
        if self.update && self.moz_central {
            return Err(invalid("update mode is only available for Glean repositories"));
        }
        if !self.glean_repos.is_empty() && self.glean_repo_url.is_some() {
            return Err(invalid("--glean-repo and --glean-repo-url are mutually exclusive"));
        }
        Ok(())
    }
}

fn glean_error(err: GleanError) -> crate::error::Error {
    let kind = match &*err {
        kind if kind.is_parse() => ErrorKind::Parse,
        GleanErrorKind::Selection(message) => ErrorKind::Configuration(message.clone()),
        GleanErrorKind::Repositories(path) => ErrorKind::Configuration(format!("cannot load {}", path.display())),
        GleanErrorKind::State(path) => ErrorKind::Output(path.clone()),
        _ => ErrorKind::Notify,
    };
    err.raise(kind)
}

/// Copy the regular files under `source` into `target`, keeping the layout.
fn copy_tree(source: &Path, target: &Path) -> Result<()> {
    for entry in WalkDir::new(source).min_depth(1) {
        let entry = entry.or_raise(|| ErrorKind::Output(source.to_path_buf()))?;
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let destination = target.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&destination).or_raise(|| ErrorKind::Output(destination.clone()))?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = destination.parent() {
                std::fs::create_dir_all(parent).or_raise(|| ErrorKind::Output(parent.to_path_buf()))?;
            }
            std::fs::copy(entry.path(), &destination).or_raise(|| ErrorKind::Output(destination.clone()))?;
        }
    }
    Ok(())
}

fn now() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

pub struct Runner {
    options: RunOptions,
    config: Config,
    storage: RemoteStorage,
    notifier: Arc<dyn Notifier>,
    output: RemoteLocation,
    cache: RemoteLocation,
}

impl Runner {
    /// Validate modes and bucket locations. No I/O happens here.
    pub fn new(options: RunOptions, config: Config, storage: RemoteStorage, notifier: Arc<dyn Notifier>) -> Result<Self> {
        options.validate()?;
        let location = |url: &str| {
            RemoteLocation::parse(url).map_err(|e| {
                let message = e.to_string();
                e.raise(ErrorKind::Configuration(message))
            })
        };
        let output = location(&config.output_bucket)?;
        let cache = location(&config.cache_bucket)?;
        Ok(Self { options, config, storage, notifier, output, cache })
    }

    /// Run every selected flow and publish. Returns the output paths that
    /// changed.
    #[instrument(skip(self), fields(env = ?self.config.env, update = self.options.update))]
    pub async fn run(&self) -> Result<Vec<PathBuf>> {
        let options = &self.options;
        if self.config.is_prod() && !options.update {
            std::fs::create_dir_all(&options.out_dir).or_raise(|| ErrorKind::Output(options.out_dir.clone()))?;
            tracing::info!(cache = %self.cache, dir = %options.cache_dir.display(), "syncing cache");
            self.storage
                .pull(&self.cache, &options.cache_dir, false)
                .await
                .or_raise(|| ErrorKind::Storage)?;
        }

        let now = now();
        let mut update_paths = Vec::new();
        if options.moz_central {
            update_paths.extend(self.moz_central(now)?);
        }
        if options.glean {
            update_paths.extend(self.glean(now).await?);
        }

        if self.config.is_prod() {
            let timeout = self.config.publish_timeout();
            let report = tokio::time::timeout(timeout, self.publish(&update_paths))
                .await
                .or_raise(|| ErrorKind::Timeout(timeout))??;
            tracing::info!(uploaded = report.uploaded, deleted = report.deleted, "published");
        }
        Ok(update_paths)
    }

    fn moz_central(&self, now: PrimitiveDateTime) -> Result<Vec<PathBuf>> {
        let options = &self.options;
        let history = history::load_revisions(&options.revisions_manifest, options.firefox_channel.as_deref(), options.versions)?;
        let parsers = ParserSet::default();
        let mut transformer = RevisionTransformer::new(&parsers);
        let transformed = transformer.transform(&history);
        for failure in &transformed.failures {
            tracing::warn!(%failure, "registry could not be parsed");
        }
        output::write_moz_central(&transformed, &options.out_dir, now)
    }

    async fn glean(&self, now: PrimitiveDateTime) -> Result<Vec<PathBuf>> {
        let options = &self.options;
        let selection = Selection::new(options.glean_repos.clone(), options.glean_repo_url.clone()).map_err(glean_error)?;
        let repositories = Repositories::load(&options.repositories_file).map_err(glean_error)?.select(&selection);
        let mut commits = history::load_commits(&options.commits_manifest, options.commit.as_deref())?;
        let mode = if options.single_commit() { ErrorMode::SingleCommit } else { ErrorMode::Batch };
        if let Some(branch) = &options.branch {
            tracing::info!(branch, commit = options.commit.as_deref(), "processing pushed branch");
        }

        let reconciler = Reconciler::new(DefinitionParsers::default(), mode);
        let mut queue = NotificationQueue::new();
        let mut states = BTreeMap::new();
        let mut updated = BTreeSet::new();
        let mut pulled = Vec::new();
        for repository in repositories.iter() {
            let prior = if options.update {
                let (state, scratch) = self.prior_state(&repository.name).await?;
                pulled.extend(scratch.map(|scratch| (repository.name.as_str(), scratch)));
                Some(state)
            } else {
                None
            };
            let repo_commits = commits.remove(&repository.name).unwrap_or_default();
            let reconciled = reconciler.reconcile(repository, prior, &repo_commits, &mut queue).map_err(glean_error)?;
            if reconciled.updated {
                updated.insert(repository.name.clone());
            }
            states.insert(repository.name.clone(), reconciled.state);
        }
        // Every repository reconciled; pulled state may now land in the output tree.
        for (name, scratch) in pulled {
            copy_tree(scratch.path(), &options.out_dir.join(GLEAN).join(name))?;
        }

        let mut findings = Vec::new();
        match repositories.len() {
            0 => tracing::warn!("no repositories selected, nothing to check"),
            1 => tracing::warn!("duplicate metric check skipped: only one repository in scope"),
            _ => findings.extend(checks::check_duplicates(&repositories, &states)),
        }
        findings.extend(checks::check_expired(updated.iter().map(String::as_str), &states, now.date()));
        let abort = checks::report(&findings, &repositories, &mut queue);

        let mut update_paths = Vec::new();
        for (name, state) in &states {
            let dir = options.out_dir.join(GLEAN).join(name);
            state.write(&dir, now).map_err(glean_error)?;
            if updated.contains(name) {
                update_paths.push(dir);
            }
        }
        if !options.single_commit() {
            update_paths.push(output::write_repositories(&repositories, &options.out_dir)?);
            update_paths.extend(output::write_general(&options.out_dir, now)?);
        }

        let notifications = &self.config.notifications;
        let delivered = queue
            .deliver(self.notifier.as_ref(), &notifications.from, &notifications.default_to, options.dry_run)
            .await;
        if abort {
            exn::bail!(ErrorKind::Validation);
        }
        delivered.map_err(glean_error)?;
        Ok(update_paths)
    }

    /// Previously published state of one repository. Production runs pull
    /// it from the output bucket into a scratch directory, returned so the
    /// caller decides whether it reaches the output tree.
    async fn prior_state(&self, name: &str) -> Result<(RepoState, Option<TempDir>)> {
        let relative = Path::new(GLEAN).join(name);
        if !self.config.is_prod() {
            let state = RepoState::read_dir(&self.options.out_dir.join(&relative)).map_err(glean_error)?;
            return Ok((state, None));
        }
        let source = self.output.join(&relative).or_raise(|| ErrorKind::Configuration(format!("invalid repository name {name}")))?;
        let scratch = tempfile::tempdir().or_raise(|| ErrorKind::Output(std::env::temp_dir()))?;
        self.storage.pull(&source, scratch.path(), true).await.or_raise(|| ErrorKind::Storage)?;
        let state = RepoState::read_dir(scratch.path()).map_err(glean_error)?;
        Ok((state, Some(scratch)))
    }

    async fn publish(&self, update_paths: &[PathBuf]) -> Result<SyncReport> {
        let options = &self.options;
        let is_empty = std::fs::read_dir(&options.out_dir).map_or(true, |mut entries| entries.next().is_none());
        if is_empty {
            exn::bail!(ErrorKind::EmptyOutput(options.out_dir.clone()));
        }

        let published = PushOptions::compressed().with_delete(true);
        let mut report = SyncReport::default();
        if options.update {
            for path in update_paths {
                let relative = path.strip_prefix(&options.out_dir).or_raise(|| ErrorKind::Output(path.clone()))?;
                let destination = self.output.join(relative).or_raise(|| ErrorKind::Output(path.clone()))?;
                report += self.storage.push(path, &destination, &published).await.or_raise(|| ErrorKind::Storage)?;
            }
        } else {
            report += self.storage.push(&options.out_dir, &self.output, &published).await.or_raise(|| ErrorKind::Storage)?;
            let cache = PushOptions::default().with_exclude(CACHE_EXCLUDE);
            report += self.storage.push(&options.cache_dir, &self.cache, &cache).await.or_raise(|| ErrorKind::Storage)?;
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use probeinfo_compress::Compression;
    use probeinfo_config::Environment;
    use probeinfo_glean::Notification;
    use probeinfo_glean::notify::DUPLICATE_METRICS;
    use probeinfo_storage::backend::MockBackend;
    use probeinfo_storage::{StaticConnector, StorageBackend};
    use rstest::rstest;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use tempfile::TempDir;

    const REPOSITORIES: &str = r#"
repositories:
  - name: glean-core
    url: https://github.com/mozilla/glean
    notification_emails: [glean-team@mozilla.com]
  - name: fenix
    url: https://github.com/mozilla-mobile/fenix
    notification_emails: [fenix@mozilla.com]
    dependencies: [glean-core]
"#;
    const UPTIME: &str = "core:\n  uptime:\n    type: timespan\n    expires: never\n";
    const LAUNCH: &str = "app:\n  launch:\n    type: event\n    expires: never\n";

    #[derive(Default)]
    struct Recording {
        subjects: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for Recording {
        async fn send(&self, _from: &str, _to: &[String], notification: &Notification) -> probeinfo_glean::error::Result<()> {
            self.subjects.lock().unwrap().push(notification.subject.clone());
            Ok(())
        }
    }

    struct Fixture {
        dir: TempDir,
        published: Arc<MockBackend>,
        cache: Arc<MockBackend>,
        notifier: Arc<Recording>,
    }

    impl Fixture {
        fn new(published: MockBackend) -> Self {
            let fixture = Self {
                dir: tempfile::tempdir().unwrap(),
                published: Arc::new(published),
                cache: Arc::new(MockBackend::default()),
                notifier: Arc::new(Recording::default()),
            };
            std::fs::write(fixture.dir.path().join("repositories.yaml"), REPOSITORIES).unwrap();
            fixture
        }

        fn glean_dir(&self) -> PathBuf {
            self.dir.path().join("cache/glean")
        }

        fn out_dir(&self) -> PathBuf {
            self.dir.path().join("out")
        }

        /// Check out `files` for `commit` and record it in the commits manifest.
        fn commit(&self, repository: &str, commit: &str, date: &str, files: &[(&str, &str)]) {
            let root = self.glean_dir().join("checkouts").join(commit);
            for (name, content) in files {
                std::fs::create_dir_all(&root).unwrap();
                std::fs::write(root.join(name), content).unwrap();
            }
            let manifest = self.glean_dir().join("commits.json");
            let mut commits: Value = std::fs::read(&manifest)
                .map(|bytes| serde_json::from_slice(&bytes).unwrap())
                .unwrap_or_else(|_| json!({}));
            let entries = commits.as_object_mut().unwrap().entry(repository).or_insert_with(|| json!([]));
            entries.as_array_mut().unwrap().push(json!({
                "commit": commit,
                "date": date,
                "root": format!("checkouts/{commit}"),
                "files": files.iter().map(|(name, _)| *name).collect::<Vec<_>>(),
            }));
            std::fs::create_dir_all(self.glean_dir()).unwrap();
            std::fs::write(&manifest, serde_json::to_vec(&commits).unwrap()).unwrap();
        }

        fn options(&self) -> RunOptions {
            let cache_dir = self.dir.path().join("cache");
            RunOptions {
                repositories_file: self.dir.path().join("repositories.yaml"),
                revisions_manifest: cache_dir.join("moz-central/revisions.json"),
                commits_manifest: self.glean_dir().join("commits.json"),
                out_dir: self.out_dir(),
                cache_dir,
                dry_run: false,
                glean_repos: Vec::new(),
                glean_repo_url: None,
                firefox_channel: None,
                versions: VersionFilter::Any,
                moz_central: false,
                glean: true,
                update: false,
                commit: None,
                branch: None,
            }
        }

        fn runner(&self, options: RunOptions, env: Environment) -> Result<Runner> {
            let config = Config {
                env,
                output_bucket: "s3://published".to_string(),
                cache_bucket: "s3://cache/probe-scraper".to_string(),
                ..Config::default()
            };
            let connector = StaticConnector::new()
                .with_bucket("published", self.published.clone())
                .with_bucket("cache", self.cache.clone());
            Runner::new(options, config, RemoteStorage::new(connector), self.notifier.clone())
        }
    }

    async fn published_json(backend: &MockBackend, key: &str) -> Value {
        let data = backend.read(Path::new(key)).await.unwrap();
        serde_json::from_slice(&Compression::Gzip.decompress(&data).unwrap()).unwrap()
    }

    fn gzipped(value: Value) -> Vec<u8> {
        Compression::Gzip.compress(&serde_json::to_vec(&value).unwrap()).unwrap()
    }

    #[rstest]
    #[case::commit_without_update(|o: &mut RunOptions| o.commit = Some("abc123".to_string()))]
    #[case::update_with_moz_central(|o: &mut RunOptions| { o.update = true; o.moz_central = true; })]
    #[case::names_and_url(|o: &mut RunOptions| {
        o.glean_repos = vec!["fenix".to_string()];
        o.glean_repo_url = Some("https://github.com/mozilla-mobile/fenix".to_string());
    })]
    fn invalid_modes_are_configuration_errors(#[case] modify: fn(&mut RunOptions)) {
        let fixture = Fixture::new(MockBackend::default());
        let mut options = fixture.options();
        modify(&mut options);
        let err = fixture.runner(options, Environment::Dev).err().unwrap();
        assert!(matches!(&*err, ErrorKind::Configuration(_)));
    }

    #[test]
    fn unknown_bucket_scheme_is_a_configuration_error() {
        let config = Config {
            output_bucket: "ftp://published".to_string(),
            ..Config::default()
        };
        let fixture = Fixture::new(MockBackend::default());
        let storage = RemoteStorage::new(StaticConnector::new());
        let err = Runner::new(fixture.options(), config, storage, fixture.notifier.clone()).err().unwrap();
        assert!(matches!(&*err, ErrorKind::Configuration(_)));
    }

    #[tokio::test]
    async fn full_run_publishes_tree_and_cache() {
        let fixture = Fixture::new(MockBackend::with_files([("stale/document", b"{}".to_vec())]));
        fixture.commit("glean-core", "abc123", "2024-01-01 00:00:00", &[("metrics.yaml", UPTIME)]);
        fixture.commit("fenix", "def456", "2024-01-02 00:00:00", &[("metrics.yaml", LAUNCH)]);
        std::fs::create_dir_all(fixture.dir.path().join("cache/fenix.git")).unwrap();
        std::fs::write(fixture.dir.path().join("cache/fenix.git/HEAD"), "ref: refs/heads/main").unwrap();

        let paths = fixture.runner(fixture.options(), Environment::Prod).unwrap().run().await.unwrap();
        let out = fixture.out_dir();
        assert!(paths.contains(&out.join("glean/glean-core")));
        assert!(paths.contains(&out.join("glean/fenix")));
        assert!(paths.contains(&out.join(output::INDEX_HTML)));

        let keys = fixture.published.keys().await;
        assert!(!keys.contains(&PathBuf::from("stale/document")));
        for key in ["general", "repositories", "index.html", "glean/fenix/dependencies", "glean/glean-core/general"] {
            assert!(keys.contains(&PathBuf::from(key)), "{key} was not published");
        }
        let index = fixture.published.headers("index.html").await.unwrap();
        assert_eq!(index.content_type.as_deref(), Some("text/html"));
        let metrics = published_json(&fixture.published, "glean/fenix/metrics").await;
        assert_eq!(metrics["def456"]["app.launch"]["type"], "event");
        let dependencies = published_json(&fixture.published, "glean/fenix/dependencies").await;
        assert_eq!(dependencies["glean-core"]["type"], "dependency");

        let cached = fixture.cache.keys().await;
        assert!(cached.contains(&PathBuf::from("probe-scraper/glean/commits.json")));
        assert!(!cached.contains(&PathBuf::from("probe-scraper/fenix.git/HEAD")));
        assert!(fixture.notifier.subjects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn single_commit_update_touches_one_repository() {
        let prior_core = gzipped(json!({"abc123": {"core.uptime": {"type": "timespan"}}}));
        let published = MockBackend::with_files([
            ("glean/fenix/metrics", gzipped(json!({"old111": {"app.old": {"type": "counter"}}}))),
            ("glean/fenix/general", gzipped(json!({"lastUpdate": "2024-01-01T00:00:00", "latestCommit": {"date": "2024-01-01T00:00:00", "commit": "old111"}}))),
            ("glean/glean-core/metrics", prior_core.clone()),
        ]);
        let fixture = Fixture::new(published);
        fixture.commit("fenix", "def456", "2024-01-02 00:00:00", &[("metrics.yaml", LAUNCH)]);
        let mut options = fixture.options();
        options.update = true;
        options.commit = Some("def456".to_string());
        options.glean_repo_url = Some("https://github.com/mozilla-mobile/fenix".to_string());

        let paths = fixture.runner(options, Environment::Prod).unwrap().run().await.unwrap();
        assert_eq!(paths, vec![fixture.out_dir().join("glean/fenix")]);

        let metrics = published_json(&fixture.published, "glean/fenix/metrics").await;
        assert_eq!(metrics["old111"]["app.old"]["type"], "counter");
        assert_eq!(metrics["def456"]["app.launch"]["type"], "event");
        let general = published_json(&fixture.published, "glean/fenix/general").await;
        assert_eq!(general["latestCommit"]["commit"], "def456");
        let untouched = fixture.published.read(Path::new("glean/glean-core/metrics")).await.unwrap();
        assert_eq!(untouched, prior_core);
        assert!(!fixture.published.keys().await.contains(&PathBuf::from("index.html")));
    }

    #[tokio::test]
    async fn single_commit_parse_error_writes_nothing() {
        let fixture = Fixture::new(MockBackend::default());
        fixture.commit("fenix", "bad000", "2024-01-02 00:00:00", &[("metrics.yaml", "app:\n  launch:\n    expires: never\n")]);
        let mut options = fixture.options();
        options.update = true;
        options.commit = Some("bad000".to_string());
        options.glean_repos = vec!["fenix".to_string()];

        let err = fixture.runner(options, Environment::Dev).unwrap().run().await.unwrap_err();
        assert_eq!(*err, ErrorKind::Parse);
        assert!(!fixture.out_dir().join("glean/fenix").exists());
    }

    #[tokio::test]
    async fn prod_single_commit_parse_error_leaves_no_pulled_state() {
        let published = MockBackend::with_files([
            ("glean/fenix/metrics", gzipped(json!({"old111": {"app.old": {"type": "counter"}}}))),
            ("glean/fenix/general", gzipped(json!({"lastUpdate": "2024-01-01T00:00:00", "latestCommit": {"date": "2024-01-01T00:00:00", "commit": "old111"}}))),
        ]);
        let fixture = Fixture::new(published);
        fixture.commit("fenix", "bad000", "2024-01-02 00:00:00", &[("metrics.yaml", "app:\n  launch:\n    expires: never\n")]);
        let mut options = fixture.options();
        options.update = true;
        options.commit = Some("bad000".to_string());
        options.glean_repos = vec!["fenix".to_string()];

        let err = fixture.runner(options, Environment::Prod).unwrap().run().await.unwrap_err();
        assert_eq!(*err, ErrorKind::Parse);
        assert!(!fixture.out_dir().join("glean/fenix").exists());
        assert_eq!(fixture.published.keys().await.len(), 2);
    }

    #[tokio::test]
    async fn batch_update_publishes_only_touched_repositories() {
        let general = |commit: &str| {
            gzipped(json!({
                "lastUpdate": "2024-01-01T00:00:00",
                "latestCommit": {"date": "2024-01-01T00:00:00", "commit": commit},
                "latestMetricsCommit": {"date": "2024-01-01T00:00:00", "commit": commit},
            }))
        };
        let prior_core = gzipped(json!({"abc123": {"core.uptime": {"type": "timespan", "expires": "never"}}}));
        let published = MockBackend::with_files([
            ("glean/glean-core/metrics", prior_core.clone()),
            ("glean/glean-core/general", general("abc123")),
            ("glean/fenix/metrics", gzipped(json!({"old111": {"app.old": {"type": "counter", "expires": "never"}}}))),
            ("glean/fenix/general", general("old111")),
        ]);
        let fixture = Fixture::new(published);
        fixture.commit("fenix", "def456", "2024-01-02 00:00:00", &[("metrics.yaml", LAUNCH)]);
        let mut options = fixture.options();
        options.update = true;

        let paths = fixture.runner(options, Environment::Prod).unwrap().run().await.unwrap();
        let out = fixture.out_dir();
        assert!(paths.contains(&out.join("glean/fenix")));
        assert!(!paths.contains(&out.join("glean/glean-core")));
        assert!(paths.contains(&out.join(output::INDEX_HTML)));

        let metrics = published_json(&fixture.published, "glean/fenix/metrics").await;
        assert_eq!(metrics["old111"]["app.old"]["type"], "counter");
        assert_eq!(metrics["def456"]["app.launch"]["type"], "event");
        let untouched = fixture.published.read(Path::new("glean/glean-core/metrics")).await.unwrap();
        assert_eq!(untouched, prior_core);
        // Reconciled without error, so pulled state reaches the local tree.
        assert!(out.join("glean/glean-core/metrics").exists());
        assert!(fixture.notifier.subjects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_output_is_not_published() {
        let fixture = Fixture::new(MockBackend::default());
        fixture.commit("fenix", "def456", "2024-01-02 00:00:00", &[("metrics.yaml", LAUNCH)]);
        let mut options = fixture.options();
        options.update = true;
        options.commit = Some("def456".to_string());
        options.glean_repo_url = Some("https://github.com/mozilla/unknown".to_string());

        let err = fixture.runner(options, Environment::Prod).unwrap().run().await.unwrap_err();
        assert_eq!(*err, ErrorKind::EmptyOutput(fixture.out_dir()));
        assert!(fixture.published.keys().await.is_empty());
    }

    #[tokio::test]
    async fn duplicates_abort_after_notifying() {
        let fixture = Fixture::new(MockBackend::default());
        fixture.commit("glean-core", "abc123", "2024-01-01 00:00:00", &[("metrics.yaml", LAUNCH)]);
        fixture.commit("fenix", "def456", "2024-01-02 00:00:00", &[("metrics.yaml", LAUNCH)]);

        let err = fixture.runner(fixture.options(), Environment::Dev).unwrap().run().await.unwrap_err();
        assert_eq!(*err, ErrorKind::Validation);
        assert_eq!(*fixture.notifier.subjects.lock().unwrap(), vec![DUPLICATE_METRICS.to_string()]);
        assert!(fixture.out_dir().join("glean/fenix/metrics").exists());
    }

    #[tokio::test]
    async fn moz_central_run_writes_firefox_tree() {
        let fixture = Fixture::new(MockBackend::default());
        let manifest_dir = fixture.dir.path().join("cache/moz-central");
        std::fs::create_dir_all(manifest_dir.join("n1")).unwrap();
        std::fs::write(manifest_dir.join("n1/Histograms.json"), r#"{"GC_MS": {"kind": "exponential"}}"#).unwrap();
        std::fs::write(
            manifest_dir.join("revisions.json"),
            r#"{"nightly": [{"revision": "n1", "version": "121", "date": "2023-11-01 00:00:00", "registries": {"histogram": ["n1/Histograms.json"]}}]}"#,
        )
        .unwrap();
        let mut options = fixture.options();
        options.glean = false;
        options.moz_central = true;

        let paths = fixture.runner(options, Environment::Dev).unwrap().run().await.unwrap();
        let firefox = fixture.out_dir().join("firefox");
        assert_eq!(paths, vec![firefox.clone()]);
        let probes: Value = serde_json::from_slice(&std::fs::read(firefox.join("nightly/main/all_probes")).unwrap()).unwrap();
        assert_eq!(probes["histogram/GC_MS"]["name"], "GC_MS");
        assert!(firefox.join("all/main/all_probes").exists());
        assert!(fixture.published.keys().await.is_empty());
    }
}
