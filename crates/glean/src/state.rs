//! Published per-repository state.
//!
//! Each repository publishes `metrics`, `pings` and `tags` documents keyed by
//! commit hash, a `dependencies` document, and a `general` document holding
//! the newest merged commit and the newest commit that changed metrics.

use crate::error::{ErrorKind, Result};
use crate::parser::FileKind;
use crate::repository::Dependency;
use exn::ResultExt;
use probeinfo_registry::{iso_date, json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use time::PrimitiveDateTime;

/// Commit hash → definition name → definition.
pub type CommitMap = BTreeMap<String, BTreeMap<String, Value>>;

pub const GENERAL: &str = "general";
pub const DEPENDENCIES: &str = "dependencies";

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommitRef {
    #[serde(with = "iso_date")]
    pub date: PrimitiveDateTime,
    pub commit: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct General {
    #[serde(with = "iso_date")]
    last_update: PrimitiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    latest_commit: Option<CommitRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    latest_metrics_commit: Option<CommitRef>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RepoState {
    pub metrics: CommitMap,
    pub pings: CommitMap,
    pub tags: CommitMap,
    pub dependencies: BTreeMap<String, Dependency>,
    pub latest: Option<CommitRef>,
    /// Newest merged commit with a `metrics` entry. Commits that only touch
    /// pings or tags leave it alone.
    pub latest_metrics_commit: Option<CommitRef>,
}

impl RepoState {
    pub fn commits(&self, kind: FileKind) -> &CommitMap {
        match kind {
            FileKind::Metrics => &self.metrics,
            FileKind::Pings => &self.pings,
            FileKind::Tags => &self.tags,
        }
    }

    pub fn commits_mut(&mut self, kind: FileKind) -> &mut CommitMap {
        match kind {
            FileKind::Metrics => &mut self.metrics,
            FileKind::Pings => &mut self.pings,
            FileKind::Tags => &mut self.tags,
        }
    }

    pub fn contains_commit(&self, commit: &str) -> bool {
        FileKind::ALL.into_iter().any(|kind| self.commits(kind).contains_key(commit))
    }

    /// Metrics currently defined: those of the newest commit that changed
    /// metrics. State published without that marker falls back to the
    /// newest commit.
    pub fn latest_metrics(&self) -> Option<&BTreeMap<String, Value>> {
        self.latest_metrics_commit
            .as_ref()
            .or(self.latest.as_ref())
            .and_then(|latest| self.metrics.get(&latest.commit))
    }

    /// Record `candidate` as the newest commit if it is newer than the current one.
    pub fn advance(&mut self, candidate: CommitRef) {
        if self.latest.as_ref().is_none_or(|latest| candidate > *latest) {
            self.latest = Some(candidate);
        }
    }

    /// Like [`advance`](Self::advance), for a commit that changed metrics.
    pub fn advance_metrics(&mut self, candidate: CommitRef) {
        if self.latest_metrics_commit.as_ref().is_none_or(|latest| candidate > *latest) {
            self.latest_metrics_commit = Some(candidate);
        }
    }

    /// Read previously published documents from `dir`. Missing documents
    /// are empty, not errors.
    #[tracing::instrument(fields(dir = %dir.display()))]
    pub fn read_dir(dir: &Path) -> Result<Self> {
        let mut state = Self::default();
        for kind in FileKind::ALL {
            if let Some(commits) = read_optional(&dir.join(kind.to_string()))? {
                *state.commits_mut(kind) = commits;
            }
        }
        if let Some(general) = read_optional::<General>(&dir.join(GENERAL))? {
            state.latest = general.latest_commit;
            state.latest_metrics_commit = general.latest_metrics_commit;
        }
        tracing::debug!(
            metrics = state.metrics.len(),
            pings = state.pings.len(),
            tags = state.tags.len(),
            "loaded prior state"
        );
        Ok(state)
    }

    /// Write every document into `dir`.
    pub fn write(&self, dir: &Path, now: PrimitiveDateTime) -> Result<Vec<PathBuf>> {
        let raise = |e: probeinfo_registry::error::Error| e.raise(ErrorKind::State(dir.to_path_buf()));
        let general = General {
            last_update: now,
            latest_commit: self.latest.clone(),
            latest_metrics_commit: self.latest_metrics_commit.clone(),
        };
        let mut written = Vec::new();
        for kind in FileKind::ALL {
            written.push(json::dump(self.commits(kind), dir, &kind.to_string()).map_err(raise)?);
        }
        written.push(json::dump(&self.dependencies, dir, DEPENDENCIES).map_err(raise)?);
        written.push(json::dump(&general, dir, GENERAL).map_err(raise)?);
        Ok(written)
    }
}

fn read_optional<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err).or_raise(|| ErrorKind::State(path.to_path_buf())),
    };
    let value = serde_json::from_slice(&bytes).or_raise(|| ErrorKind::State(path.to_path_buf()))?;
    Ok(Some(value))
}
