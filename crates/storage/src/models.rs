//! Storage models.
//!
//! Metadata returned by backend listings, and the HTTP-ish headers attached
//! to uploaded objects.

use probeinfo_compress::Compression;
use std::path::PathBuf;
use time::OffsetDateTime;

pub const CONTENT_TYPE_HTML: &str = "text/html";
pub const CONTENT_TYPE_JSON: &str = "application/json";
/// Published documents may be cached by clients for eight hours.
pub const CACHE_CONTROL_PUBLISHED: &str = "max-age=28800";

/// File metadata returned by storage backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Key relative to the bucket (or filesystem) root
    pub path: PathBuf,
    /// Object size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub modified: OffsetDateTime,
}
impl FileInfo {
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: OffsetDateTime) -> Self {
        Self {
            path: path.into(),
            size,
            modified,
        }
    }
}

/// Metadata sent alongside an object on upload. Backends without a notion of
/// object metadata (the local filesystem) ignore it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub cache_control: Option<String>,
    /// Grant anonymous read access where the backend supports canned ACLs.
    pub public_read: bool,
}
impl Headers {
    /// Headers for a publicly served document stored with `compression`.
    ///
    /// ```
    /// use probeinfo_compress::Compression;
    /// use probeinfo_storage::Headers;
    ///
    /// let headers = Headers::published("index.html", Compression::Gzip);
    /// assert_eq!(headers.content_type.as_deref(), Some("text/html"));
    /// assert_eq!(headers.content_encoding.as_deref(), Some("gzip"));
    /// ```
    pub fn published(file_name: &str, compression: Compression) -> Self {
        let content_type = match file_name {
            "index.html" => CONTENT_TYPE_HTML,
            _ => CONTENT_TYPE_JSON,
        };
        Self {
            content_type: Some(content_type.to_string()),
            content_encoding: compression.content_encoding().map(str::to_string),
            cache_control: Some(CACHE_CONTROL_PUBLISHED.to_string()),
            public_read: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("index.html", CONTENT_TYPE_HTML)]
    #[case("metrics", CONTENT_TYPE_JSON)]
    #[case("all_probes", CONTENT_TYPE_JSON)]
    fn published_content_type(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(Headers::published(name, Compression::Gzip).content_type.as_deref(), Some(expected));
    }

    #[test]
    fn published_identity_has_no_encoding() {
        let headers = Headers::published("general", Compression::None);
        assert_eq!(headers.content_encoding, None);
        assert_eq!(headers.cache_control.as_deref(), Some(CACHE_CONTROL_PUBLISHED));
        assert!(headers.public_read);
    }
}
