//! Content-addressed payload interning.

use crate::canonical::content_hash;
use crate::model::ProbeId;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Result of interning one payload.
#[derive(Clone, Debug)]
pub struct Interned {
    pub hash: blake3::Hash,
    /// `false` when an identical payload was already stored for this probe.
    pub is_new: bool,
    /// The stored payload. Identical content always yields the same allocation.
    pub payload: Arc<Value>,
}

/// Per-run table of distinct payloads, keyed by probe identity then content
/// hash. Grows monotonically and is dropped with the run.
#[derive(Debug, Default)]
pub struct DedupTable {
    entries: HashMap<ProbeId, HashMap<blake3::Hash, Arc<Value>>>,
    lookups: usize,
}

impl DedupTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn canonicalize(&mut self, id: &ProbeId, payload: Value) -> Interned {
        self.lookups += 1;
        let hash = content_hash(&payload);
        let stored = self.entries.entry(id.clone()).or_default();
        if let Some(existing) = stored.get(&hash) {
            return Interned { hash, is_new: false, payload: Arc::clone(existing) };
        }
        let payload = Arc::new(payload);
        stored.insert(hash, Arc::clone(&payload));
        Interned { hash, is_new: true, payload }
    }

    /// Number of distinct payloads stored for `id`.
    pub fn distinct(&self, id: &ProbeId) -> usize {
        self.entries.get(id).map_or(0, HashMap::len)
    }

    /// Number of distinct payloads stored across all probes.
    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of payloads offered to the table.
    pub fn lookups(&self) -> usize {
        self.lookups
    }
}
