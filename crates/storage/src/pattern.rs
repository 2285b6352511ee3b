//! Exclude patterns.
//!
//! Patterns are fnmatch-style globs where `*` also matches `/`, tested
//! against paths relative to the sync root. Directories are tested with a
//! trailing `/`, so `*.git/*` prunes a whole `.git` tree before descending.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use globset::{GlobBuilder, GlobMatcher};
use std::path::Path;

#[derive(Clone, Debug)]
pub struct ExcludePattern {
    pattern: String,
    matcher: GlobMatcher,
}

impl ExcludePattern {
    /// ```
    /// use std::path::Path;
    /// use probeinfo_storage::ExcludePattern;
    ///
    /// let exclude = ExcludePattern::new("*.git/*").unwrap();
    /// assert!(exclude.matches(Path::new("fenix.git/HEAD"), false));
    /// assert!(exclude.matches(Path::new("glean/fenix.git"), true));
    /// assert!(!exclude.matches(Path::new("glean/fenix/metrics"), false));
    /// ```
    pub fn new(pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        let matcher = GlobBuilder::new(&pattern)
            .literal_separator(false)
            .backslash_escape(true)
            .build()
            .or_raise(|| ErrorKind::InvalidPattern(pattern.clone()))?
            .compile_matcher();
        Ok(Self { pattern, matcher })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, relative: &Path, is_dir: bool) -> bool {
        if self.matcher.is_match(relative) {
            return true;
        }
        is_dir && self.matcher.is_match(format!("{}/", relative.to_string_lossy()))
    }
}
