//! Glean definition parsers.
//!
//! Each parser reads the `metrics.yaml`, `pings.yaml` or `tags.yaml` files
//! changed by one commit. An unreadable or non-mapping file is an `Err`;
//! individual invalid definitions are reported in [`Definitions::errors`]
//! and left out of the records.

use crate::error::{ErrorKind, Result};
use crate::repository::Repository;
use derive_more::Display;
use probeinfo_config::document;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Category reserved for Glean's own metrics.
const RESERVED_CATEGORY: &str = "glean";
/// Metrics in this category are identified by name alone.
const INTERNAL_CATEGORY: &str = "glean.internal.metrics";
const RESERVED_PINGS: [&str; 6] = ["baseline", "metrics", "events", "deletion-request", "default", "all-pings"];

/// Legacy ping names and their published spelling.
const PING_NAMES: [(&str, &str); 4] = [
    ("deletion_request", "deletion-request"),
    ("bookmarks_sync", "bookmarks-sync"),
    ("history_sync", "history-sync"),
    ("session_end", "session-end"),
];

pub fn normalize_ping_name(name: &str) -> &str {
    PING_NAMES.iter().find(|(legacy, _)| *legacy == name).map_or(name, |(_, normalized)| normalized)
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileKind {
    #[display("metrics")]
    Metrics,
    #[display("pings")]
    Pings,
    #[display("tags")]
    Tags,
}

impl FileKind {
    pub const ALL: [FileKind; 3] = [Self::Metrics, Self::Pings, Self::Tags];

    /// Classify a changed file by the suffix of its name.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        Self::ALL.into_iter().find(|kind| name.ends_with(&format!("{kind}.yaml")))
    }
}

/// Per-repository parser settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ParserConfig {
    pub allow_reserved: bool,
}

impl From<&Repository> for ParserConfig {
    fn from(repository: &Repository) -> Self {
        Self { allow_reserved: repository.allow_reserved() }
    }
}

/// Where the files being parsed were checked out.
#[derive(Clone, Copy, Debug)]
pub struct Source<'a> {
    pub repository: &'a Repository,
    pub commit: &'a str,
    pub root: &'a Path,
}

impl Source<'_> {
    fn url(&self, path: &Path) -> String {
        self.repository.source_url(self.commit, path.strip_prefix(self.root).unwrap_or(path))
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct Definitions {
    pub records: BTreeMap<String, Value>,
    pub errors: Vec<String>,
}

pub trait DefinitionParser: Send + Sync {
    fn kind(&self) -> FileKind;

    fn parse(&self, files: &[PathBuf], config: &ParserConfig, source: &Source<'_>) -> Result<Definitions>;
}

/// Load every existing file as a mapping, skipping `$schema`-style keys.
fn load_files(files: &[PathBuf]) -> Result<Vec<(&Path, Map<String, Value>)>> {
    let mut loaded = Vec::new();
    for path in files.iter().filter(|path| path.is_file()) {
        let Value::Object(mut map) =
            document::load(path).map_err(|e| e.raise(ErrorKind::Parse(path.to_path_buf())))?
        else {
            exn::bail!(ErrorKind::Parse(path.to_path_buf()));
        };
        map.retain(|key, _| !key.starts_with('$') && key != "no_lint");
        loaded.push((path.as_path(), map));
    }
    Ok(loaded)
}

fn annotate(definition: &mut Map<String, Value>, source: &Source<'_>, path: &Path) {
    definition.remove("defined_in");
    definition.insert("source_url".to_string(), Value::String(source.url(path)));
}

#[derive(Debug, Default)]
pub struct MetricsParser;

impl MetricsParser {
    fn metric(
        &self,
        id: &str,
        definition: Value,
        config: &ParserConfig,
        reserved: bool,
    ) -> std::result::Result<Map<String, Value>, String> {
        let Value::Object(mut definition) = definition else {
            return Err(format!("{id}: definition is not a mapping"));
        };
        if reserved && !config.allow_reserved {
            return Err(format!("{id}: category {RESERVED_CATEGORY} is reserved"));
        }
        if !definition.get("type").is_some_and(Value::is_string) {
            return Err(format!("{id}: missing type"));
        }
        let pings = match definition.remove("send_in_pings") {
            None => vec![Value::from("metrics")],
            Some(Value::Array(pings)) => pings
                .into_iter()
                .map(|ping| match ping {
                    Value::String(name) => Ok(Value::from(normalize_ping_name(&name))),
                    _ => Err(format!("{id}: send_in_pings must be a list of names")),
                })
                .collect::<std::result::Result<_, _>>()?,
            Some(_) => return Err(format!("{id}: send_in_pings must be a list of names")),
        };
        definition.insert("send_in_pings".to_string(), Value::Array(pings));
        Ok(definition)
    }
}

impl DefinitionParser for MetricsParser {
    fn kind(&self) -> FileKind {
        FileKind::Metrics
    }

    fn parse(&self, files: &[PathBuf], config: &ParserConfig, source: &Source<'_>) -> Result<Definitions> {
        let mut definitions = Definitions::default();
        for (path, categories) in load_files(files)? {
            for (category, metrics) in categories {
                let Value::Object(metrics) = metrics else {
                    definitions.errors.push(format!("{category}: category is not a mapping"));
                    continue;
                };
                let reserved = category == RESERVED_CATEGORY || category.starts_with("glean.");
                for (name, definition) in metrics {
                    let id = if category == INTERNAL_CATEGORY { name } else { format!("{category}.{name}") };
                    match self.metric(&id, definition, config, reserved) {
                        Ok(mut metric) => {
                            annotate(&mut metric, source, path);
                            definitions.records.insert(id, Value::Object(metric));
                        },
                        Err(error) => definitions.errors.push(error),
                    }
                }
            }
        }
        Ok(definitions)
    }
}

#[derive(Debug, Default)]
pub struct PingsParser;

impl DefinitionParser for PingsParser {
    fn kind(&self) -> FileKind {
        FileKind::Pings
    }

    fn parse(&self, files: &[PathBuf], config: &ParserConfig, source: &Source<'_>) -> Result<Definitions> {
        let mut definitions = Definitions::default();
        for (path, pings) in load_files(files)? {
            for (name, definition) in pings {
                let name = normalize_ping_name(&name).to_string();
                let Value::Object(mut ping) = definition else {
                    definitions.errors.push(format!("{name}: definition is not a mapping"));
                    continue;
                };
                if RESERVED_PINGS.contains(&name.as_str()) && !config.allow_reserved {
                    definitions.errors.push(format!("{name}: ping name is reserved"));
                    continue;
                }
                annotate(&mut ping, source, path);
                definitions.records.insert(name, Value::Object(ping));
            }
        }
        Ok(definitions)
    }
}

#[derive(Debug, Default)]
pub struct TagsParser;

impl DefinitionParser for TagsParser {
    fn kind(&self) -> FileKind {
        FileKind::Tags
    }

    fn parse(&self, files: &[PathBuf], _config: &ParserConfig, source: &Source<'_>) -> Result<Definitions> {
        let mut definitions = Definitions::default();
        for (path, tags) in load_files(files)? {
            for (name, definition) in tags {
                match definition {
                    Value::Object(mut tag) if tag.get("description").is_some_and(Value::is_string) => {
                        annotate(&mut tag, source, path);
                        definitions.records.insert(name, Value::Object(tag));
                    },
                    _ => definitions.errors.push(format!("{name}: tag needs a description")),
                }
            }
        }
        Ok(definitions)
    }
}

/// One parser per definition file kind.
pub struct DefinitionParsers {
    parsers: BTreeMap<FileKind, Box<dyn DefinitionParser>>,
}

impl DefinitionParsers {
    pub fn with(mut self, parser: impl DefinitionParser + 'static) -> Self {
        self.parsers.insert(parser.kind(), Box::new(parser));
        self
    }

    pub fn get(&self, kind: FileKind) -> Option<&dyn DefinitionParser> {
        self.parsers.get(&kind).map(Box::as_ref)
    }
}

impl Default for DefinitionParsers {
    fn default() -> Self {
        Self { parsers: BTreeMap::new() }.with(MetricsParser).with(PingsParser).with(TagsParser)
    }
}
