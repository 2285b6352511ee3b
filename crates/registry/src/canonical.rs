//! Canonical serialization and content hashing.
//!
//! Object keys are sorted at every level, so payloads that differ only in
//! key order serialize, and therefore hash, identically.

use serde_json::Value;
use std::fmt::{self, Display, Formatter, Write as _};

/// Displays a [`Value`] in canonical compact form.
pub struct Canonical<'a>(pub &'a Value);

impl Display for Canonical<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.0 {
            Value::Null | Value::Bool(_) | Value::Number(_) => write!(f, "{}", self.0),
            Value::String(s) => write_str(f, s),
            Value::Array(items) => {
                f.write_char('[')?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_char(',')?;
                    }
                    write!(f, "{}", Canonical(item))?;
                }
                f.write_char(']')
            },
            Value::Object(map) => {
                let mut entries: Vec<_> = map.iter().collect();
                entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
                f.write_char('{')?;
                for (i, (key, value)) in entries.into_iter().enumerate() {
                    if i > 0 {
                        f.write_char(',')?;
                    }
                    write_str(f, key)?;
                    f.write_char(':')?;
                    write!(f, "{}", Canonical(value))?;
                }
                f.write_char('}')
            },
        }
    }
}

fn write_str(f: &mut Formatter<'_>, s: &str) -> fmt::Result {
    let escaped = serde_json::to_string(s).map_err(|_| fmt::Error)?;
    f.write_str(&escaped)
}

/// Canonical compact serialization of `value`.
pub fn to_canonical_string(value: &Value) -> String {
    Canonical(value).to_string()
}

/// BLAKE3 digest of the canonical serialization of `value`.
///
/// ```
/// use serde_json::json;
/// use probeinfo_registry::canonical::content_hash;
///
/// let a = json!({"kind": "boolean", "expires": "never"});
/// let b = json!({"expires": "never", "kind": "boolean"});
/// assert_eq!(content_hash(&a), content_hash(&b));
/// ```
pub fn content_hash(value: &Value) -> blake3::Hash {
    blake3::hash(to_canonical_string(value).as_bytes())
}
