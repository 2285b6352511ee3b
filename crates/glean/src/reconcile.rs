//! Merging newly scraped commits into published repository state.
//!
//! A repository starts [`Phase::Empty`] (full mode, or nothing published
//! yet) or [`Phase::Loaded`] (prior state pulled back in update mode), and
//! ends [`Phase::Merged`] once every new commit is folded in. Merging is a
//! union keyed by commit hash: a commit already present is skipped, so the
//! order commits arrive in does not matter and repeating a commit is a no-op.

use crate::error::{ErrorKind, Result};
use crate::notify::{IMPROPER_FILE, Notification, NotificationQueue, PARSE_ERRORS};
use crate::parser::{DefinitionParsers, FileKind, ParserConfig, Source};
use crate::repository::Repository;
use crate::state::{CommitRef, RepoState};
use derive_more::Display;
use probeinfo_registry::probe_date;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use time::PrimitiveDateTime;
use tracing::instrument;

/// One scraped commit and the definition files it changed.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Commit {
    #[serde(rename = "commit")]
    pub hash: String,
    #[serde(with = "probe_date")]
    pub date: PrimitiveDateTime,
    /// Checkout the `files` are relative to.
    pub root: PathBuf,
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

/// What happens when a commit's definitions cannot be used.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ErrorMode {
    /// Queue a notification for the repository and carry on.
    #[default]
    Batch,
    /// Fail immediately so a single pushed commit can be rejected.
    SingleCommit,
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum Phase {
    #[display("empty")]
    Empty,
    #[display("loaded")]
    Loaded,
    #[display("merged")]
    Merged,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Reconciled {
    pub state: RepoState,
    /// At least one commit was merged in this run.
    pub updated: bool,
    pub merged_commits: Vec<String>,
}

pub struct Reconciliation<'a> {
    repository: &'a Repository,
    state: RepoState,
    phase: Phase,
    merged: Vec<String>,
}

impl<'a> Reconciliation<'a> {
    pub fn empty(repository: &'a Repository) -> Self {
        Self { repository, state: RepoState::default(), phase: Phase::Empty, merged: Vec::new() }
    }

    pub fn loaded(repository: &'a Repository, state: RepoState) -> Self {
        Self { repository, state, phase: Phase::Loaded, merged: Vec::new() }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> &RepoState {
        &self.state
    }

    /// Fold one commit in. Returns `false` when nothing was merged.
    pub fn merge(
        &mut self,
        commit: &Commit,
        parsers: &DefinitionParsers,
        mode: ErrorMode,
        queue: &mut NotificationQueue,
    ) -> Result<bool> {
        let repository = self.repository;
        if self.state.contains_commit(&commit.hash) {
            tracing::debug!(repository = repository.name, commit = commit.hash, "commit already merged, skipping");
            return Ok(false);
        }
        let mut files: BTreeMap<FileKind, Vec<PathBuf>> = BTreeMap::new();
        for file in &commit.files {
            if let Some(kind) = FileKind::from_path(file) {
                files.entry(kind).or_default().push(commit.root.join(file));
            }
        }
        if files.is_empty() {
            return Ok(false);
        }

        let config = ParserConfig::from(repository);
        let source = Source { repository, commit: &commit.hash, root: &commit.root };
        let mut parsed = BTreeMap::new();
        let mut errors = Vec::new();
        for (kind, paths) in &files {
            let Some(parser) = parsers.get(*kind) else {
                continue;
            };
            match parser.parse(paths, &config, &source) {
                Ok(definitions) => {
                    errors.extend(definitions.errors);
                    parsed.insert(*kind, definitions.records);
                },
                Err(err) if mode == ErrorMode::SingleCommit => return Err(err),
                // Other kinds of this commit are still merged.
                Err(err) => {
                    let names: Vec<_> = paths.iter().map(|path| path.display().to_string()).collect();
                    tracing::warn!(repository = repository.name, commit = commit.hash, %kind, error = %err, "improper file");
                    queue.push(repository, Notification::new(IMPROPER_FILE, format!("Improper file in {}\n{err}", names.join(", "))));
                },
            }
        }
        if parsed.is_empty() {
            return Ok(false);
        }

        if !errors.is_empty() {
            let kind = ErrorKind::Definitions { repository: repository.name.clone(), commit: commit.hash.clone(), errors };
            if mode == ErrorMode::SingleCommit {
                exn::bail!(kind);
            }
            tracing::warn!(repository = repository.name, commit = commit.hash, %kind, "invalid definitions");
            queue.push(repository, Notification::new(PARSE_ERRORS, kind.to_string()));
        }

        let reference = CommitRef { date: commit.date, commit: commit.hash.clone() };
        if parsed.contains_key(&FileKind::Metrics) {
            self.state.advance_metrics(reference.clone());
        }
        for (kind, records) in parsed {
            self.state.commits_mut(kind).insert(commit.hash.clone(), records);
        }
        self.state.advance(reference);
        self.merged.push(commit.hash.clone());
        Ok(true)
    }

    pub fn finish(mut self) -> Reconciled {
        self.phase = Phase::Merged;
        self.state.dependencies = self.repository.dependencies_document();
        tracing::info!(
            repository = self.repository.name,
            phase = %self.phase,
            merged = self.merged.len(),
            "reconciled repository"
        );
        Reconciled { updated: !self.merged.is_empty(), state: self.state, merged_commits: self.merged }
    }
}

pub struct Reconciler {
    parsers: DefinitionParsers,
    mode: ErrorMode,
}

impl Reconciler {
    pub fn new(parsers: DefinitionParsers, mode: ErrorMode) -> Self {
        Self { parsers, mode }
    }

    pub fn mode(&self) -> ErrorMode {
        self.mode
    }

    /// Merge `commits` into `prior` (or into empty state).
    #[instrument(skip_all, fields(repository = %repository.name, commits = commits.len()))]
    pub fn reconcile(
        &self,
        repository: &Repository,
        prior: Option<RepoState>,
        commits: &[Commit],
        queue: &mut NotificationQueue,
    ) -> Result<Reconciled> {
        let mut reconciliation = match prior {
            Some(state) => Reconciliation::loaded(repository, state),
            None => Reconciliation::empty(repository),
        };
        for commit in commits {
            reconciliation.merge(commit, &self.parsers, self.mode, queue)?;
        }
        Ok(reconciliation.finish())
    }
}
