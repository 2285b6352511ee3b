use crate::Compression;
use std::fmt::{Display, Formatter, Result as FmtResult};

impl Display for Compression {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Compression::None => f.write_str("none"),
            Compression::Gzip => f.write_str("gzip"),
        }
    }
}

impl Compression {
    /// The `Content-Encoding` header value to attach to objects stored in
    /// this format. Identity encoding sends no header.
    #[inline]
    #[must_use]
    pub fn content_encoding(&self) -> Option<&'static str> {
        match self {
            Compression::None => None,
            Compression::Gzip => Some("gzip"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::Compression;
    use rstest::rstest;

    #[rstest]
    #[case(Compression::None, "none", None)]
    #[case(Compression::Gzip, "gzip", Some("gzip"))]
    fn test_display_and_header(#[case] format: Compression, #[case] name: &str, #[case] header: Option<&str>) {
        assert_eq!(format.to_string(), name);
        assert_eq!(format.content_encoding(), header);
    }
}
