//! Structured definition documents.
//!
//! Registry and repository files are YAML or JSON, chosen by extension.
//! They are loaded through the same `figment` providers as the
//! configuration, into any deserializable type.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Format as _, Json, Yaml};
use serde::de::DeserializeOwned;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
}
impl Format {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Load the document at `path` as a generic JSON value.
pub fn load(path: &Path) -> Result<serde_json::Value> {
    load_as(path)
}

/// Load the document at `path`, choosing the format from its extension.
pub fn load_as<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let format = Format::from_path(path).ok_or_else(|| exn::Exn::from(ErrorKind::UnsupportedFormat(path.to_path_buf())))?;
    let text = std::fs::read_to_string(path).or_raise(|| ErrorKind::Read(path.to_path_buf()))?;
    from_str(&text, format).map_err(|e| e.raise(ErrorKind::Parse(path.to_path_buf())))
}

/// Parse a document held in memory. The top level must be a mapping.
pub fn from_str<T: DeserializeOwned>(text: &str, format: Format) -> Result<T> {
    let figment = match format {
        Format::Yaml => Figment::from(Yaml::string(text)),
        Format::Json => Figment::from(Json::string(text)),
    };
    figment.extract().or_raise(|| ErrorKind::Invalid("document is not a mapping of the expected shape".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    const METRICS_YAML: &str = r#"
$schema: moz://mozilla.org/schemas/glean/metrics/2-0-0
app:
  launch:
    type: event
    expires: never
    bugs:
      - https://bugzilla.mozilla.org/1
"#;

    #[test]
    fn yaml_document() {
        let value: serde_json::Value = from_str(METRICS_YAML, Format::Yaml).unwrap();
        assert_eq!(value["app"]["launch"]["type"], json!("event"));
        assert_eq!(value["app"]["launch"]["bugs"], json!(["https://bugzilla.mozilla.org/1"]));
    }

    #[rstest]
    #[case("metrics.yaml", Some(Format::Yaml))]
    #[case("repositories.YML", Some(Format::Yaml))]
    #[case("Histograms.json", Some(Format::Json))]
    #[case("pings", None)]
    fn format_from_path(#[case] path: &str, #[case] expected: Option<Format>) {
        assert_eq!(Format::from_path(Path::new(path)), expected);
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Histograms.json");
        std::fs::write(&path, r#"{"GC_MS": {"kind": "exponential", "high": 10000}}"#).unwrap();
        let value = load(&path).unwrap();
        assert_eq!(value, json!({"GC_MS": {"kind": "exponential", "high": 10000}}));
    }

    #[test]
    fn load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("missing.yaml")).unwrap_err();
        assert_eq!(*err, ErrorKind::Read(dir.path().join("missing.yaml")));

        let broken = dir.path().join("broken.yaml");
        std::fs::write(&broken, "app: [unclosed").unwrap();
        let err = load(&broken).unwrap_err();
        assert_eq!(*err, ErrorKind::Parse(broken));

        let err = load(Path::new("notes.txt")).unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
    }
}
