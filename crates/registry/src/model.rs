use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Formatter};
use std::path::PathBuf;
use std::str::FromStr;
use time::PrimitiveDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

/// Date format used for revision timestamps and first-appearance dates.
pub const DATE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

// Serde adapter for `YYYY-MM-DD HH:MM:SS` timestamps.
time::serde::format_description!(
    pub probe_date,
    PrimitiveDateTime,
    "[year]-[month]-[day] [hour]:[minute]:[second]"
);

// Serde adapter for ISO-8601 timestamps without an offset.
time::serde::format_description!(
    pub iso_date,
    PrimitiveDateTime,
    "[year]-[month]-[day]T[hour]:[minute]:[second]"
);

/// The registry a probe is defined in.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    #[display("histogram")]
    Histogram,
    #[display("scalar")]
    Scalar,
    #[display("event")]
    Event,
}

impl ProbeKind {
    pub const ALL: [ProbeKind; 3] = [Self::Histogram, Self::Scalar, Self::Event];
}

impl FromStr for ProbeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|kind| kind.to_string() == s).ok_or_else(|| s.to_string())
    }
}

/// Probe identity: `(type, name)`, rendered as `<type>/<name>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProbeId {
    kind: ProbeKind,
    name: String,
}

impl ProbeId {
    pub fn new(kind: ProbeKind, name: impl Into<String>) -> Self {
        Self { kind, name: name.into() }
    }

    pub fn kind(&self) -> ProbeKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ProbeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

impl Serialize for ProbeId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One revision of one channel and the registry files captured at it.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RevisionEntry {
    pub revision: String,
    pub version: String,
    #[serde(with = "probe_date")]
    pub date: PrimitiveDateTime,
    #[serde(default)]
    pub registries: BTreeMap<ProbeKind, Vec<PathBuf>>,
}

/// Revisions grouped by channel, in any order.
pub type History = BTreeMap<String, Vec<RevisionEntry>>;
