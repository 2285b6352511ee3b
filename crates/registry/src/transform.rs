//! Folding revision histories into per-channel probe sets.

use crate::dedup::DedupTable;
use crate::model::{DATE_FORMAT, History, ProbeId, ProbeKind, RevisionEntry, iso_date};
use crate::parser::{ParseContext, ParserSet};
use derive_more::Display;
use serde::ser::{Error as _, SerializeMap};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use time::PrimitiveDateTime;
use tracing::instrument;

/// Name of the synthetic channel holding the union of every channel.
pub const ALL_CHANNELS: &str = "all";

pub type ChannelProbeSet = BTreeMap<ProbeId, ChannelProbe>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Span<T> {
    pub first: T,
    pub last: T,
}

impl<T: Clone> Span<T> {
    fn single(value: &T) -> Self {
        Self { first: value.clone(), last: value.clone() }
    }
}

fn format_date<E: serde::ser::Error>(date: &PrimitiveDateTime) -> Result<String, E> {
    date.format(DATE_FORMAT).map_err(E::custom)
}

/// A run of consecutive revisions sharing one payload.
#[derive(Clone, Debug)]
pub struct HistoryEntry {
    pub payload: Arc<Value>,
    pub revisions: Span<String>,
    pub versions: Span<String>,
    pub dates: Span<PrimitiveDateTime>,
}

impl HistoryEntry {
    fn new(payload: Arc<Value>, entry: &RevisionEntry) -> Self {
        Self {
            payload,
            revisions: Span::single(&entry.revision),
            versions: Span::single(&entry.version),
            dates: Span::single(&entry.date),
        }
    }

    fn extend(&mut self, entry: &RevisionEntry) {
        self.revisions.last.clone_from(&entry.revision);
        self.versions.last.clone_from(&entry.version);
        self.dates.last = entry.date;
    }
}

const SPAN_KEYS: [&str; 3] = ["revisions", "versions", "dates"];

impl Serialize for HistoryEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        match self.payload.as_ref() {
            Value::Object(fields) => {
                for (key, value) in fields.iter().filter(|(key, _)| !SPAN_KEYS.contains(&key.as_str())) {
                    map.serialize_entry(key, value)?;
                }
            },
            other => map.serialize_entry("definition", other)?,
        }
        map.serialize_entry("revisions", &self.revisions)?;
        map.serialize_entry("versions", &self.versions)?;
        let dates = Span {
            first: format_date::<S::Error>(&self.dates.first)?,
            last: format_date::<S::Error>(&self.dates.last)?,
        };
        map.serialize_entry("dates", &dates)?;
        map.end()
    }
}

/// One probe as seen on one channel (or on all of them).
#[derive(Clone, Debug)]
pub struct ChannelProbe {
    pub id: ProbeId,
    /// Payload observed at the newest revision.
    pub definition: Arc<Value>,
    /// Per channel, newest entry first.
    pub history: BTreeMap<String, Vec<HistoryEntry>>,
    pub first_added: BTreeMap<String, PrimitiveDateTime>,
    latest: PrimitiveDateTime,
}

impl ChannelProbe {
    fn new(id: ProbeId, definition: Arc<Value>, latest: PrimitiveDateTime) -> Self {
        Self { id, definition, history: BTreeMap::new(), first_added: BTreeMap::new(), latest }
    }

    /// Earliest first-appearance date across the channels this probe records.
    pub fn first_appeared(&self) -> Option<PrimitiveDateTime> {
        self.first_added.values().min().copied()
    }

    fn note_date(&mut self, channel: &str, date: PrimitiveDateTime) {
        self.first_added
            .entry(channel.to_string())
            .and_modify(|first| *first = (*first).min(date))
            .or_insert(date);
    }

    fn observe(&mut self, channel: &str, entry: &RevisionEntry, payload: Arc<Value>) {
        self.note_date(channel, entry.date);
        if entry.date >= self.latest {
            self.definition = Arc::clone(&payload);
            self.latest = entry.date;
        }
        let runs = self.history.entry(channel.to_string()).or_default();
        match runs.last_mut() {
            Some(last) if Arc::ptr_eq(&last.payload, &payload) => last.extend(entry),
            _ => runs.push(HistoryEntry::new(payload, entry)),
        }
    }

    fn absorb(&mut self, channel: &str, other: &ChannelProbe) {
        for date in other.first_added.values() {
            self.note_date(channel, *date);
        }
        if other.latest >= self.latest {
            self.definition = Arc::clone(&other.definition);
            self.latest = other.latest;
        }
        self.history.insert(channel.to_string(), other.history.get(channel).cloned().unwrap_or_default());
    }
}

impl Serialize for ChannelProbe {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let first_added = self
            .first_added
            .iter()
            .map(|(channel, date)| Ok((channel, format_date::<S::Error>(date)?)))
            .collect::<Result<BTreeMap<_, _>, S::Error>>()?;
        let mut map = serializer.serialize_map(Some(5))?;
        map.serialize_entry("name", self.id.name())?;
        map.serialize_entry("type", &self.id.kind())?;
        map.serialize_entry("definition", self.definition.as_ref())?;
        map.serialize_entry("history", &self.history)?;
        map.serialize_entry("first_added", &first_added)?;
        map.end()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RevisionInfo {
    #[serde(with = "iso_date")]
    pub date: PrimitiveDateTime,
    pub version: String,
}

/// A registry that could not be parsed at one revision.
#[derive(Clone, Debug, Display, PartialEq, Eq, Serialize)]
#[display("{channel}@{revision} ({kind}): {message}")]
pub struct ParseFailure {
    pub channel: String,
    pub revision: String,
    pub kind: ProbeKind,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct Transformed {
    /// Every input channel plus [`ALL_CHANNELS`].
    pub channels: BTreeMap<String, ChannelProbeSet>,
    /// Channel → revision → date and version.
    pub revisions: BTreeMap<String, BTreeMap<String, RevisionInfo>>,
    pub failures: Vec<ParseFailure>,
}

pub struct RevisionTransformer<'p> {
    parsers: &'p ParserSet,
    dedup: DedupTable,
}

impl<'p> RevisionTransformer<'p> {
    pub fn new(parsers: &'p ParserSet) -> Self {
        Self { parsers, dedup: DedupTable::new() }
    }

    pub fn dedup(&self) -> &DedupTable {
        &self.dedup
    }

    /// Parse every registry of every revision and fold the records into
    /// probe sets. Parse failures are collected, never fatal.
    #[instrument(skip_all, fields(channels = history.len()))]
    pub fn transform(&mut self, history: &History) -> Transformed {
        let mut transformed = Transformed::default();
        let mut all = ChannelProbeSet::new();
        for (channel, entries) in history {
            if channel == ALL_CHANNELS {
                tracing::warn!(channel, "channel name is reserved, skipping its revisions");
                continue;
            }
            let set = self.fold_channel(channel, entries, &mut transformed);
            for (id, probe) in &set {
                all.entry(id.clone())
                    .or_insert_with(|| ChannelProbe::new(id.clone(), Arc::clone(&probe.definition), probe.latest))
                    .absorb(channel, probe);
            }
            transformed.channels.insert(channel.clone(), set);
        }
        transformed.channels.insert(ALL_CHANNELS.to_string(), all);
        tracing::info!(
            distinct = self.dedup.len(),
            lookups = self.dedup.lookups(),
            failures = transformed.failures.len(),
            "folded revision history"
        );
        transformed
    }

    fn fold_channel(&mut self, channel: &str, entries: &[RevisionEntry], transformed: &mut Transformed) -> ChannelProbeSet {
        let mut ordered: Vec<&RevisionEntry> = entries.iter().collect();
        ordered.sort_by_key(|entry| entry.date);
        let mut set = ChannelProbeSet::new();
        for entry in ordered {
            transformed
                .revisions
                .entry(channel.to_string())
                .or_default()
                .insert(entry.revision.clone(), RevisionInfo { date: entry.date, version: entry.version.clone() });
            let context = ParseContext { channel, revision: &entry.revision, version: &entry.version };
            for (kind, paths) in &entry.registries {
                let failure = |message: String| ParseFailure {
                    channel: channel.to_string(),
                    revision: entry.revision.clone(),
                    kind: *kind,
                    message,
                };
                let Some(parser) = self.parsers.get(*kind) else {
                    transformed.failures.push(failure("no parser registered".to_string()));
                    continue;
                };
                let parsed = match parser.parse(paths, &context) {
                    Ok(parsed) => parsed,
                    Err(err) => {
                        tracing::warn!(channel, revision = entry.revision, %kind, error = %err, "registry parse failed");
                        transformed.failures.push(failure(err.to_string()));
                        continue;
                    },
                };
                transformed.failures.extend(parsed.errors.into_iter().map(failure));
                for (name, payload) in parsed.records {
                    let id = ProbeId::new(*kind, name);
                    let interned = self.dedup.canonicalize(&id, payload);
                    set.entry(id.clone())
                        .or_insert_with(|| ChannelProbe::new(id, Arc::clone(&interned.payload), entry.date))
                        .observe(channel, entry, interned.payload);
                }
            }
        }
        for probe in set.values_mut() {
            for runs in probe.history.values_mut() {
                runs.reverse();
            }
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::{Path, PathBuf};
    use time::macros::datetime;

    struct Fixture {
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self { dir: tempfile::tempdir().unwrap() }
        }

        fn histograms(&self, name: &str, value: serde_json::Value) -> PathBuf {
            let path = self.dir.path().join(format!("{name}.json"));
            std::fs::write(&path, value.to_string()).unwrap();
            path
        }

        fn revision(&self, revision: &str, version: &str, date: PrimitiveDateTime, path: &Path) -> RevisionEntry {
            RevisionEntry {
                revision: revision.to_string(),
                version: version.to_string(),
                date,
                registries: BTreeMap::from([(ProbeKind::Histogram, vec![path.to_path_buf()])]),
            }
        }
    }

    fn gc_ms() -> ProbeId {
        ProbeId::new(ProbeKind::Histogram, "GC_MS")
    }

    #[test]
    fn unchanged_payload_is_stored_once() {
        let fixture = Fixture::new();
        let v1 = fixture.histograms("v1", json!({"GC_MS": {"kind": "exponential", "expires_in_version": "never"}}));
        let v1_reordered = fixture.histograms("v1b", json!({"GC_MS": {"expires_in_version": "never", "kind": "exponential"}}));
        let entries: Vec<_> = (0..30)
            .map(|i| {
                let path = if i % 2 == 0 { &v1 } else { &v1_reordered };
                let date = datetime!(2023-01-01 00:00:00) + time::Duration::days(i);
                fixture.revision(&format!("r{i}"), "110", date, path)
            })
            .collect();
        let history = History::from([("nightly".to_string(), entries)]);
        let parsers = ParserSet::default();
        let mut transformer = RevisionTransformer::new(&parsers);
        let transformed = transformer.transform(&history);

        assert_eq!(transformer.dedup().distinct(&gc_ms()), 1);
        let probe = &transformed.channels["nightly"][&gc_ms()];
        let runs = &probe.history["nightly"];
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].revisions, Span { first: "r0".to_string(), last: "r29".to_string() });
        assert!(Arc::ptr_eq(&runs[0].payload, &probe.definition));
    }

    #[test]
    fn first_appearance_per_channel_and_all() {
        let fixture = Fixture::new();
        let old = fixture.histograms("old", json!({"GC_MS": {"kind": "flag"}}));
        let both = fixture.histograms("both", json!({"GC_MS": {"kind": "flag"}, "NEW_PROBE": {"kind": "count"}}));
        let history = History::from([
            (
                "nightly".to_string(),
                vec![
                    // Deliberately out of order.
                    fixture.revision("n2", "121", datetime!(2023-06-01 12:00:00), &both),
                    fixture.revision("n1", "120", datetime!(2023-05-01 08:30:00), &old),
                ],
            ),
            ("release".to_string(), vec![fixture.revision("r1", "119", datetime!(2023-07-04 00:00:00), &both)]),
        ]);
        let parsers = ParserSet::default();
        let transformed = RevisionTransformer::new(&parsers).transform(&history);

        let new_probe = ProbeId::new(ProbeKind::Histogram, "NEW_PROBE");
        let nightly = &transformed.channels["nightly"];
        assert_eq!(nightly[&gc_ms()].first_added, BTreeMap::from([("nightly".to_string(), datetime!(2023-05-01 08:30:00))]));
        assert_eq!(nightly[&new_probe].first_added["nightly"], datetime!(2023-06-01 12:00:00));

        let release = &transformed.channels["release"];
        assert_eq!(release[&gc_ms()].first_added.len(), 1);
        assert_eq!(release[&gc_ms()].first_added["release"], datetime!(2023-07-04 00:00:00));

        let all = &transformed.channels[ALL_CHANNELS][&gc_ms()];
        assert_eq!(all.first_added.len(), 2);
        assert_eq!(all.first_appeared(), Some(datetime!(2023-05-01 08:30:00)));
        assert!(all.first_appeared() <= release[&gc_ms()].first_appeared());
        assert_eq!(transformed.revisions["nightly"]["n1"].version, "120");
    }

    #[test]
    fn history_is_newest_first() {
        let fixture = Fixture::new();
        let a = fixture.histograms("a", json!({"GC_MS": {"expires_in_version": "100"}}));
        let b = fixture.histograms("b", json!({"GC_MS": {"expires_in_version": "120"}}));
        let history = History::from([(
            "beta".to_string(),
            vec![
                fixture.revision("r1", "99", datetime!(2022-01-01 00:00:00), &a),
                fixture.revision("r2", "100", datetime!(2022-02-01 00:00:00), &a),
                fixture.revision("r3", "101", datetime!(2022-03-01 00:00:00), &b),
            ],
        )]);
        let parsers = ParserSet::default();
        let transformed = RevisionTransformer::new(&parsers).transform(&history);
        let probe = &transformed.channels["beta"][&gc_ms()];
        let runs = &probe.history["beta"];
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].revisions.first, "r3");
        assert_eq!(runs[1].versions, Span { first: "99".to_string(), last: "100".to_string() });
        assert_eq!(*probe.definition, json!({"expires_in_version": "120"}));

        let serialized = serde_json::to_value(probe).unwrap();
        assert_eq!(serialized["name"], json!("GC_MS"));
        assert_eq!(serialized["type"], json!("histogram"));
        assert_eq!(serialized["first_added"]["beta"], json!("2022-01-01 00:00:00"));
        assert_eq!(serialized["history"]["beta"][1]["expires_in_version"], json!("100"));
        assert_eq!(serialized["history"]["beta"][1]["dates"]["last"], json!("2022-02-01 00:00:00"));
    }

    #[test]
    fn parse_failure_does_not_stop_other_revisions() {
        let fixture = Fixture::new();
        let good = fixture.histograms("good", json!({"GC_MS": {"kind": "flag"}}));
        let broken = fixture.dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();
        let history = History::from([
            (
                "nightly".to_string(),
                vec![
                    fixture.revision("bad", "120", datetime!(2023-01-01 00:00:00), &broken),
                    fixture.revision("good", "121", datetime!(2023-02-01 00:00:00), &good),
                ],
            ),
            ("beta".to_string(), vec![fixture.revision("b1", "120", datetime!(2023-01-15 00:00:00), &good)]),
        ]);
        let parsers = ParserSet::default();
        let transformed = RevisionTransformer::new(&parsers).transform(&history);
        assert_eq!(transformed.failures.len(), 1);
        assert_eq!(transformed.failures[0].revision, "bad");
        assert_eq!(transformed.failures[0].kind, ProbeKind::Histogram);
        assert_eq!(transformed.channels["nightly"][&gc_ms()].first_added["nightly"], datetime!(2023-02-01 00:00:00));
        assert!(transformed.channels["beta"].contains_key(&gc_ms()));
    }

    #[test]
    fn missing_parser_is_a_failure() {
        let fixture = Fixture::new();
        let path = fixture.histograms("h", json!({"GC_MS": {}}));
        let history = History::from([("nightly".to_string(), vec![fixture.revision("r1", "1", datetime!(2020-01-01 00:00:00), &path)])]);
        let parsers = ParserSet::empty();
        let transformed = RevisionTransformer::new(&parsers).transform(&history);
        assert_eq!(transformed.failures.len(), 1);
        assert!(transformed.channels[ALL_CHANNELS].is_empty());
    }
}
