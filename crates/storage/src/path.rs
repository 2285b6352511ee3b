//! Path validation and security utilities.
//!
//! Object keys and local sync paths share one normal form: relative, no `.`
//! or `..` components, no empty segments.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a storage key or relative path.
/// Ensures that keys don't escape the bucket or directory root (no `..`
/// traversal). A leading `/` is dropped, so absolute local paths become keys
/// relative to the filesystem root.
///
/// > **Note:** This does **not** normalize backslashes, non-UTF8 bytes, or
/// >           platform-specific weirdness. Null bytes are explicitly rejected.
///
/// # Returns
/// Returns the normalized path if valid, or [`InvalidPath`](crate::error::ErrorKind::InvalidPath)
/// if invalid.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use probeinfo_storage::validate_path;
/// // Valid paths
/// assert!(validate_path("glean/fenix/metrics").is_ok());
/// assert!(validate_path("firefox/nightly/main/all_probes").is_ok());
/// assert!(validate_path("glean/../general").is_ok()); // (never leaves the root)
/// // Invalid paths
/// assert!(validate_path("../etc/passwd").is_err());
/// assert!(validate_path("glean/../../b").is_err()); // (leaves the root)
/// assert!(validate_path("a\0b").is_err());
/// // Paths get resolved
/// assert_eq!(
///     validate_path("/cache/../probe-scraper/./glean//fenix/").unwrap(),
///     Path::new("probe-scraper/glean/fenix")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let mut components = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
        false => Ok(components.into_iter().collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("glean/fenix/metrics", "glean/fenix/metrics")]
    #[case("firefox//nightly/./main", "firefox/nightly/main")]
    #[case("/tmp/probe-output/", "tmp/probe-output")]
    #[case("glean/fenix/..", "glean")]
    #[case("probe-scraper///", "probe-scraper")]
    fn test_valid_paths(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(validate(Path::new(input)).unwrap(), Path::new(expected));
    }

    #[rstest]
    #[case("../etc/passwd")]
    #[case("glean/../../b")]
    #[case("..")]
    #[case("a\0b")]
    #[case("")]
    #[case("./.")]
    #[case("//")]
    fn test_invalid_paths(#[case] input: &str) {
        let err = validate(Path::new(input)).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }
}
