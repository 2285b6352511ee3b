//! Probe registries across a revision history.
//!
//! Parsed registry records are interned by content ([`DedupTable`]) so that
//! a definition unchanged over thousands of revisions is stored once, then
//! folded per channel by [`RevisionTransformer`] into probe sets annotated
//! with history spans and first-appearance dates.

pub mod canonical;
mod dedup;
pub mod error;
pub mod json;
mod model;
pub mod parser;
mod transform;

pub use crate::dedup::{DedupTable, Interned};
pub use crate::model::{DATE_FORMAT, History, ProbeId, ProbeKind, RevisionEntry, iso_date, probe_date};
pub use crate::parser::{ParseContext, Parsed, ParserSet, ProbeParser};
pub use crate::transform::{
    ALL_CHANNELS, ChannelProbe, ChannelProbeSet, HistoryEntry, ParseFailure, RevisionInfo, RevisionTransformer, Span,
    Transformed,
};
