//! Compression Operations

use crate::Compression;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use flate2::{Compression as GzCompression, read::GzDecoder, write::GzEncoder};
use std::fs::{File, create_dir_all};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::instrument;

const GZIP_LEVEL: GzCompression = GzCompression::best();

impl Compression {
    /// Compress a byte slice in memory.
    ///
    /// # Examples
    ///
    /// ```
    /// use probeinfo_compress::Compression;
    ///
    /// let data = br#"{"histogram/GC_MS": {"expires": "never"}}"#;
    /// let compressed = Compression::Gzip.compress(data).unwrap();
    /// assert_eq!(Compression::from_magic_bytes(&compressed), Compression::Gzip);
    /// ```
    pub fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.compress_into(input, &mut output)?;
        Ok(output)
    }

    /// Decompress a byte slice in memory.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probeinfo_compress::Compression;
    ///
    /// let original = b"{}";
    /// let compressed = Compression::Gzip.compress(original).unwrap();
    /// assert_ne!(compressed, original);
    /// let decompressed = Compression::Gzip.decompress(&compressed).unwrap();
    /// assert_eq!(decompressed, original);
    /// ```
    pub fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.decompress_into(input, &mut output)?;
        Ok(output)
    }

    #[instrument(skip(input, output), fields(
        format = %self,
        input_size = input.len(),
        output_size
    ))]
    pub fn compress_into(&self, input: &[u8], output: &mut Vec<u8>) -> Result<usize> {
        let size = match self {
            Compression::None => {
                output.extend_from_slice(input);
                input.len()
            },
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(&mut *output, GZIP_LEVEL);
                encoder.write_all(input).or_raise(|| ErrorKind::Io)?;
                encoder.finish().or_raise(|| ErrorKind::Io)?;
                output.len()
            },
        };
        tracing::Span::current().record("output_size", size);
        Ok(size)
    }

    #[instrument(skip(input, output), fields(
        format = %self,
        input_size = input.len(),
        output_size
    ))]
    pub fn decompress_into(&self, input: &[u8], output: &mut Vec<u8>) -> Result<usize> {
        let size = match self {
            Compression::None => {
                output.extend_from_slice(input);
                input.len()
            },
            Compression::Gzip => {
                let mut decoder = GzDecoder::new(input);
                decoder.read_to_end(output).or_raise(|| ErrorKind::InvalidData)?
            },
        };
        tracing::Span::current().record("output_size", size);
        Ok(size)
    }

    fn wrap_reader<'a, R: Read + 'a>(&self, reader: R) -> Box<dyn Read + 'a> {
        match self {
            Compression::None => Box::new(reader),
            Compression::Gzip => Box::new(GzDecoder::new(reader)),
        }
    }

    /// Encode the file at `source` into a new file at `target`, creating any
    /// missing parent directories of `target`. Returns the number of
    /// uncompressed bytes read from `source`.
    ///
    /// # Examples
    ///
    /// ```
    /// use probeinfo_compress::Compression;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let source = dir.path().join("metrics");
    /// std::fs::write(&source, b"{}").unwrap();
    /// let target = dir.path().join("scratch/glean/metrics");
    /// assert_eq!(Compression::Gzip.compress_file(&source, &target).unwrap(), 2);
    /// ```
    #[instrument(fields(format = %self, source = %source.display(), target = %target.display()))]
    pub fn compress_file(&self, source: &Path, target: &Path) -> Result<u64> {
        let mut input = BufReader::new(File::open(source).or_raise(|| ErrorKind::File(source.to_path_buf()))?);
        let output = Self::create(target)?;
        match self {
            Compression::None => {
                let mut output = BufWriter::new(output);
                let size = std::io::copy(&mut input, &mut output).or_raise(|| ErrorKind::Io)?;
                output.flush().or_raise(|| ErrorKind::Io)?;
                Ok(size)
            },
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(BufWriter::new(output), GZIP_LEVEL);
                let size = std::io::copy(&mut input, &mut encoder).or_raise(|| ErrorKind::Io)?;
                encoder.finish().or_raise(|| ErrorKind::Io)?.flush().or_raise(|| ErrorKind::Io)?;
                Ok(size)
            },
        }
    }

    /// Decode the file at `source` into a new file at `target`, creating any
    /// missing parent directories of `target`. Returns the number of decoded
    /// bytes written.
    #[instrument(fields(format = %self, source = %source.display(), target = %target.display()))]
    pub fn decompress_file(&self, source: &Path, target: &Path) -> Result<u64> {
        let input = BufReader::new(File::open(source).or_raise(|| ErrorKind::File(source.to_path_buf()))?);
        let mut reader = self.wrap_reader(input);
        let mut output = BufWriter::new(Self::create(target)?);
        let size = std::io::copy(&mut reader, &mut output).or_raise(|| ErrorKind::InvalidData)?;
        output.flush().or_raise(|| ErrorKind::Io)?;
        Ok(size)
    }

    fn create(target: &Path) -> Result<File> {
        if let Some(parent) = target.parent() {
            create_dir_all(parent).or_raise(|| ErrorKind::File(parent.to_path_buf()))?;
        }
        File::create(target).or_raise(|| ErrorKind::File(target.to_path_buf()))
    }
}
