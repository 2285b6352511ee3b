//! History manifests.
//!
//! The revision and commit scrapers leave JSON manifests in the cache
//! directory. Paths inside a manifest are relative to the manifest itself.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use probeinfo_glean::Commit;
use probeinfo_registry::History;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Which Firefox versions of the revision history to keep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VersionFilter {
    #[default]
    Any,
    Exactly(u32),
    AtLeast(u32),
}

impl VersionFilter {
    pub fn new(exact: Option<u32>, minimum: Option<u32>) -> Self {
        match (exact, minimum) {
            (Some(version), _) => Self::Exactly(version),
            (None, Some(version)) => Self::AtLeast(version),
            (None, None) => Self::Any,
        }
    }

    fn accepts(&self, version: &str) -> bool {
        let major = version.split('.').next().and_then(|major| major.parse::<u32>().ok());
        match (self, major) {
            (Self::Any, _) => true,
            (Self::Exactly(wanted), Some(major)) => major == *wanted,
            (Self::AtLeast(minimum), Some(major)) => major >= *minimum,
            (_, None) => false,
        }
    }
}

fn read<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).or_raise(|| ErrorKind::History(path.to_path_buf()))?;
    serde_json::from_reader(BufReader::new(file)).or_raise(|| ErrorKind::History(path.to_path_buf()))
}

fn base(path: &Path) -> &Path {
    path.parent().unwrap_or(Path::new("."))
}

/// Load the revisions manifest, keeping `channel` (or every channel) and
/// the revisions `versions` accepts.
pub fn load_revisions(path: &Path, channel: Option<&str>, versions: VersionFilter) -> Result<History> {
    let mut history: History = read(path)?;
    history.retain(|name, _| channel.is_none_or(|channel| channel == name));
    for entries in history.values_mut() {
        entries.retain(|entry| versions.accepts(&entry.version));
        for entry in entries.iter_mut() {
            for paths in entry.registries.values_mut() {
                for registry in paths.iter_mut() {
                    *registry = base(path).join(&*registry);
                }
            }
        }
    }
    tracing::info!(
        path = %path.display(),
        channels = history.len(),
        revisions = history.values().map(Vec::len).sum::<usize>(),
        "loaded revisions manifest"
    );
    Ok(history)
}

/// Load the commits manifest, keeping only `commit` when given.
pub fn load_commits(path: &Path, commit: Option<&str>) -> Result<BTreeMap<String, Vec<Commit>>> {
    let mut commits: BTreeMap<String, Vec<Commit>> = read(path)?;
    for entries in commits.values_mut() {
        entries.retain(|entry| commit.is_none_or(|commit| commit == entry.hash));
        for entry in entries.iter_mut() {
            entry.root = base(path).join(&entry.root);
        }
    }
    tracing::info!(
        path = %path.display(),
        repositories = commits.len(),
        commits = commits.values().map(Vec::len).sum::<usize>(),
        "loaded commits manifest"
    );
    Ok(commits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use probeinfo_registry::ProbeKind;
    use rstest::rstest;
    use std::path::PathBuf;

    #[rstest]
    #[case(VersionFilter::Any, "121.0a1", true)]
    #[case(VersionFilter::Exactly(121), "121.0a1", true)]
    #[case(VersionFilter::Exactly(121), "120", false)]
    #[case(VersionFilter::AtLeast(120), "121", true)]
    #[case(VersionFilter::AtLeast(120), "119.0.1", false)]
    #[case(VersionFilter::AtLeast(120), "nightly", false)]
    fn version_filter(#[case] filter: VersionFilter, #[case] version: &str, #[case] expected: bool) {
        assert_eq!(filter.accepts(version), expected);
    }

    #[test]
    fn revisions_are_filtered_and_resolved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("revisions.json");
        std::fs::write(
            &path,
            r#"{
              "nightly": [
                {"revision": "n1", "version": "121", "date": "2023-11-01 00:00:00", "registries": {"histogram": ["n1/Histograms.json"]}},
                {"revision": "n0", "version": "119", "date": "2023-09-01 00:00:00"}
              ],
              "release": [{"revision": "r1", "version": "120", "date": "2023-10-01 00:00:00"}]
            }"#,
        )
        .unwrap();
        let history = load_revisions(&path, Some("nightly"), VersionFilter::AtLeast(120)).unwrap();
        assert_eq!(history.keys().collect::<Vec<_>>(), vec!["nightly"]);
        let entries = &history["nightly"];
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].registries[&ProbeKind::Histogram], vec![dir.path().join("n1/Histograms.json")]);
    }

    #[test]
    fn commits_for_one_commit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commits.json");
        std::fs::write(
            &path,
            r#"{"glean-core": [
                {"commit": "abc123", "date": "2024-01-01 00:00:00", "root": "checkouts/abc123", "files": ["metrics.yaml"]},
                {"commit": "def456", "date": "2024-01-02 00:00:00", "root": "checkouts/def456"}
            ]}"#,
        )
        .unwrap();
        let commits = load_commits(&path, Some("abc123")).unwrap();
        let entries = &commits["glean-core"];
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].root, dir.path().join("checkouts/abc123"));
        assert_eq!(entries[0].files, vec![PathBuf::from("metrics.yaml")]);
        assert_eq!(load_commits(&path, None).unwrap()["glean-core"].len(), 2);
    }

    #[test]
    fn missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("revisions.json");
        let err = load_revisions(&path, None, VersionFilter::Any).unwrap_err();
        assert_eq!(*err, ErrorKind::History(path));
    }
}
