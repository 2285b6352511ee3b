//! Repositories scraped for Glean definitions.

use crate::error::{ErrorKind, Result};
use probeinfo_config::document;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub notification_emails: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub prototype: bool,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Dependency {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: String,
}

impl Repository {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            notification_emails: Vec::new(),
            dependencies: Vec::new(),
            prototype: false,
            deprecated: false,
            branch: None,
        }
    }

    /// Reserved namespaces are only available to Glean's own repositories.
    pub fn allow_reserved(&self) -> bool {
        self.name.starts_with("glean")
    }

    /// Link to `file` (relative to the repository root) at `commit`.
    pub fn source_url(&self, commit: &str, file: &Path) -> String {
        let relative: Vec<_> = file
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect();
        format!("{}/blob/{commit}/{}", self.url.trim_end_matches('/'), relative.join("/"))
    }

    pub fn dependencies_document(&self) -> BTreeMap<String, Dependency> {
        self.dependencies
            .iter()
            .map(|name| (name.clone(), Dependency { kind: "dependency", name: name.clone() }))
            .collect()
    }
}

/// Which repositories a run covers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selection {
    All,
    Names(Vec<String>),
    Url(String),
}

impl Selection {
    pub fn new(names: Vec<String>, url: Option<String>) -> Result<Self> {
        match (names.is_empty(), url) {
            (false, Some(_)) => exn::bail!(ErrorKind::Selection(
                "repository names and a repository URL are mutually exclusive".to_string()
            )),
            (_, Some(url)) => Ok(Self::Url(url)),
            (false, None) => Ok(Self::Names(names)),
            (true, None) => Ok(Self::All),
        }
    }

    fn matches(&self, repository: &Repository) -> bool {
        match self {
            Self::All => true,
            Self::Names(names) => names.contains(&repository.name),
            Self::Url(url) => repository.url == *url,
        }
    }
}

#[derive(Deserialize)]
struct RepositoriesFile {
    repositories: Vec<Repository>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Repositories(Vec<Repository>);

impl Repositories {
    /// Load a repositories file (YAML or JSON).
    pub fn load(path: &Path) -> Result<Self> {
        let file: RepositoriesFile =
            document::load_as(path).map_err(|e| e.raise(ErrorKind::Repositories(path.to_path_buf())))?;
        tracing::debug!(path = %path.display(), count = file.repositories.len(), "loaded repositories");
        Ok(Self(file.repositories))
    }

    pub fn get(&self, name: &str) -> Option<&Repository> {
        self.0.iter().find(|repository| repository.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Repository> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn select(&self, selection: &Selection) -> Repositories {
        Self(self.0.iter().filter(|repository| selection.matches(repository)).cloned().collect())
    }
}

impl From<Vec<Repository>> for Repositories {
    fn from(repositories: Vec<Repository>) -> Self {
        Self(repositories)
    }
}
