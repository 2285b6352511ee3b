//! Content encodings for published documents.
//!
//! Everything the publisher uploads is either stored as-is or individually
//! gzipped, and every object fetched back from a published tree needs the
//! reverse. This crate wraps [`flate2`] behind a small [`Compression`] enum,
//! providing:
//!
//! - **Format detection** from magic bytes ([`Compression::from_magic_bytes`])
//!   and the matching `Content-Encoding` value ([`Compression::content_encoding`])
//! - **In-memory** compression/decompression ([`Compression::compress`],
//!   [`Compression::decompress`])
//! - **File-to-file** transforms used to build scratch trees before an upload
//!   ([`Compression::compress_file`], [`Compression::decompress_file`])

mod construct;
pub mod error;
mod ops;
mod util;

/// A supported content encoding.
///
/// Defaults to [`None`](Self::None) (identity encoding).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Identity encoding, bytes are passed through untouched.
    #[default]
    None,
    /// Gzip compression (.gz, `Content-Encoding: gzip`)
    Gzip,
}
