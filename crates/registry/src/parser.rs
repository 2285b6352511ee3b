//! Probe registry parsers.
//!
//! A parser turns the registry files of one probe type at one revision into
//! `name → definition` records. Parsers are pure: the same files and
//! context always produce the same records.

use crate::error::{ErrorKind, Result};
use crate::model::ProbeKind;
use probeinfo_config::document;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Where the files being parsed were captured.
#[derive(Clone, Copy, Debug)]
pub struct ParseContext<'a> {
    pub channel: &'a str,
    pub revision: &'a str,
    pub version: &'a str,
}

/// Records parsed from one registry, plus non-fatal problems found in it.
#[derive(Debug, Default, PartialEq)]
pub struct Parsed {
    pub records: BTreeMap<String, Value>,
    pub errors: Vec<String>,
}

impl Parsed {
    fn insert(&mut self, name: String, definition: Value, path: &Path) {
        if self.records.contains_key(&name) {
            self.errors.push(format!("{name} is defined more than once (again in {})", path.display()));
        }
        self.records.insert(name, definition);
    }
}

pub trait ProbeParser: Send + Sync {
    fn kind(&self) -> ProbeKind;

    /// Parse `paths`. An `Err` means the registry as a whole is unusable.
    fn parse(&self, paths: &[PathBuf], context: &ParseContext<'_>) -> Result<Parsed>;
}

fn load_mapping(path: &Path) -> Result<Map<String, Value>> {
    match document::load(path).map_err(|e| e.raise(ErrorKind::Parse(path.to_path_buf())))? {
        Value::Object(map) => Ok(map),
        _ => exn::bail!(ErrorKind::Parse(path.to_path_buf())),
    }
}

/// Flat `name → definition` JSON registries (histograms).
#[derive(Debug, Default)]
pub struct HistogramParser;

impl ProbeParser for HistogramParser {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Histogram
    }

    fn parse(&self, paths: &[PathBuf], _context: &ParseContext<'_>) -> Result<Parsed> {
        let mut parsed = Parsed::default();
        for path in paths {
            for (name, definition) in load_mapping(path)? {
                parsed.insert(name, definition, path);
            }
        }
        Ok(parsed)
    }
}

/// `category → name → definition` YAML registries (scalars and events).
/// Records are named `category.name`.
#[derive(Debug)]
pub struct CategorisedParser {
    kind: ProbeKind,
}

impl CategorisedParser {
    pub fn new(kind: ProbeKind) -> Self {
        Self { kind }
    }
}

impl ProbeParser for CategorisedParser {
    fn kind(&self) -> ProbeKind {
        self.kind
    }

    fn parse(&self, paths: &[PathBuf], _context: &ParseContext<'_>) -> Result<Parsed> {
        let mut parsed = Parsed::default();
        for path in paths {
            for (category, probes) in load_mapping(path)? {
                if category.starts_with('$') {
                    continue;
                }
                let Value::Object(probes) = probes else {
                    parsed.errors.push(format!("{category} in {} is not a mapping", path.display()));
                    continue;
                };
                for (name, definition) in probes {
                    if !definition.is_object() {
                        parsed.errors.push(format!("{category}.{name} in {} is not a mapping", path.display()));
                        continue;
                    }
                    parsed.insert(format!("{category}.{name}"), definition, path);
                }
            }
        }
        Ok(parsed)
    }
}

/// The parser used for each registry type.
pub struct ParserSet {
    parsers: HashMap<ProbeKind, Box<dyn ProbeParser>>,
}

impl ParserSet {
    pub fn empty() -> Self {
        Self { parsers: HashMap::new() }
    }

    pub fn with(mut self, parser: impl ProbeParser + 'static) -> Self {
        self.parsers.insert(parser.kind(), Box::new(parser));
        self
    }

    pub fn get(&self, kind: ProbeKind) -> Option<&dyn ProbeParser> {
        self.parsers.get(&kind).map(Box::as_ref)
    }
}

impl Default for ParserSet {
    fn default() -> Self {
        Self::empty()
            .with(HistogramParser)
            .with(CategorisedParser::new(ProbeKind::Scalar))
            .with(CategorisedParser::new(ProbeKind::Event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CONTEXT: ParseContext<'static> = ParseContext { channel: "nightly", revision: "a1b2c3", version: "121" };

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn histograms() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "Histograms.json",
            r#"{"GC_MS": {"kind": "exponential", "high": 10000}, "A11Y_INSTANTIATED_FLAG": {"kind": "flag"}}"#,
        );
        let parsed = HistogramParser.parse(&[path], &CONTEXT).unwrap();
        assert!(parsed.errors.is_empty());
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records["GC_MS"], json!({"kind": "exponential", "high": 10000}));
    }

    #[test]
    fn scalars_are_named_by_category() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "Scalars.yaml",
            "$schema: ignored\nbrowser.engagement:\n  tab_open_event_count:\n    kind: uint\n    expires: never\n  broken: 3\n",
        );
        let parsed = CategorisedParser::new(ProbeKind::Scalar).parse(&[path], &CONTEXT).unwrap();
        assert_eq!(
            parsed.records.keys().collect::<Vec<_>>(),
            vec!["browser.engagement.tab_open_event_count"]
        );
        assert_eq!(parsed.errors.len(), 1);
        assert!(parsed.errors[0].starts_with("browser.engagement.broken"));
    }

    #[test]
    fn duplicates_across_files_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let first = write(dir.path(), "a.json", r#"{"GC_MS": {"kind": "flag"}}"#);
        let second = write(dir.path(), "b.json", r#"{"GC_MS": {"kind": "count"}}"#);
        let parsed = HistogramParser.parse(&[first, second], &CONTEXT).unwrap();
        assert_eq!(parsed.records["GC_MS"], json!({"kind": "count"}));
        assert_eq!(parsed.errors.len(), 1);
    }

    #[test]
    fn unreadable_registry_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("Events.yaml");
        let err = CategorisedParser::new(ProbeKind::Event).parse(&[missing.clone()], &CONTEXT).unwrap_err();
        assert_eq!(*err, ErrorKind::Parse(missing));
    }

    #[test]
    fn default_set_covers_every_kind() {
        let parsers = ParserSet::default();
        for kind in ProbeKind::ALL {
            assert_eq!(parsers.get(kind).map(|p| p.kind()), Some(kind));
        }
        assert!(ParserSet::empty().get(ProbeKind::Event).is_none());
    }
}
