//! Deterministic JSON documents.
//!
//! Published documents must be byte-stable between runs: keys are sorted at
//! every level, indentation is two spaces, and non-ASCII characters are
//! written as lowercase `\uXXXX` escapes.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::Serialize;
use serde_json::ser::{Formatter, PrettyFormatter};
use serde_json::{Map, Value};
use std::fs::{File, create_dir_all};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

struct AsciiPretty<'a>(PrettyFormatter<'a>);

impl Formatter for AsciiPretty<'_> {
    fn begin_array<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_array(writer)
    }

    fn end_array<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_array(writer)
    }

    fn begin_array_value<W: ?Sized + Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.0.begin_array_value(writer, first)
    }

    fn end_array_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_array_value(writer)
    }

    fn begin_object<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_object(writer)
    }

    fn end_object<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_object(writer)
    }

    fn begin_object_key<W: ?Sized + Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.0.begin_object_key(writer, first)
    }

    fn begin_object_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_object_value(writer)
    }

    fn end_object_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_object_value(writer)
    }

    fn write_string_fragment<W: ?Sized + Write>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()> {
        let mut start = 0;
        for (index, c) in fragment.char_indices() {
            if c.is_ascii() {
                continue;
            }
            writer.write_all(&fragment.as_bytes()[start..index])?;
            let mut units = [0; 2];
            for unit in c.encode_utf16(&mut units) {
                write!(writer, "\\u{unit:04x}")?;
            }
            start = index + c.len_utf8();
        }
        writer.write_all(&fragment.as_bytes()[start..])
    }
}

fn sorted(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.into_iter().collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().map(|(key, value)| (key, sorted(value))).collect::<Map<_, _>>())
        },
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        other => other,
    }
}

/// Serialize `value` as a deterministic document.
///
/// ```
/// let text = probeinfo_registry::json::to_vec(&serde_json::json!({"b": "ü", "a": []})).unwrap();
/// assert_eq!(text, b"{\n  \"a\": [],\n  \"b\": \"\\u00fc\"\n}");
/// ```
pub fn to_vec<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let value = serde_json::to_value(value).or_raise(|| ErrorKind::Serialize(std::any::type_name::<T>().to_string()))?;
    let mut output = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut output, AsciiPretty(PrettyFormatter::with_indent(b"  ")));
    sorted(value)
        .serialize(&mut serializer)
        .or_raise(|| ErrorKind::Serialize(std::any::type_name::<T>().to_string()))?;
    Ok(output)
}

/// Write `value` to `dir/name`, creating `dir` if needed.
#[tracing::instrument(skip(value), fields(dir = %dir.display()))]
pub fn dump<T: Serialize + ?Sized>(value: &T, dir: &Path, name: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    let contents = to_vec(value)?;
    create_dir_all(dir).or_raise(|| ErrorKind::Write(dir.to_path_buf()))?;
    let mut file = BufWriter::new(File::create(&path).or_raise(|| ErrorKind::Write(path.clone()))?);
    file.write_all(&contents).or_raise(|| ErrorKind::Write(path.clone()))?;
    file.flush().or_raise(|| ErrorKind::Write(path.clone()))?;
    tracing::debug!(path = %path.display(), bytes = contents.len(), "wrote document");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn layout_matches_published_format() {
        let value = json!({
            "zeta": {"b": 1, "a": [true, null]},
            "alpha": "x",
            "empty": {},
        });
        let text = String::from_utf8(to_vec(&value).unwrap()).unwrap();
        assert_eq!(
            text,
            "{\n  \"alpha\": \"x\",\n  \"empty\": {},\n  \"zeta\": {\n    \"a\": [\n      true,\n      null\n    ],\n    \"b\": 1\n  }\n}"
        );
    }

    #[rstest]
    #[case("plain", "\"plain\"")]
    #[case("Größe", "\"Gr\\u00f6\\u00dfe\"")]
    #[case("emoji 🦀", "\"emoji \\ud83e\\udd80\"")]
    #[case("quote \" and \n", "\"quote \\\" and \\n\"")]
    fn strings_are_ascii(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(String::from_utf8(to_vec(input).unwrap()).unwrap(), expected);
    }

    #[test]
    fn dump_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("firefox/nightly/main");
        let path = dump(&json!({"histogram/GC_MS": {}}), &target, "all_probes").unwrap();
        assert_eq!(path, target.join("all_probes"));
        let read: Value = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(read, json!({"histogram/GC_MS": {}}));
    }
}
