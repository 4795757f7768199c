// Streaming delta encoder.
//
// `VcEncoder` indexes the dictionary once, then cuts the target into
// `chunk_size` pieces and encodes each as one self-contained window.
// Only one chunk of target is resident at a time.

use std::io::{self, Write};

use log::debug;

use super::chunk::ChunkEncoder;
use super::custom_table::CustomCodeTable;
use crate::buffer::ByteBuffer;
use crate::checksum::adler32_combine;
use crate::error::{Result, VcdiffError};
use crate::hash::{BlockHash, DEFAULT_BLOCK_SIZE};
use crate::vcdiff::encoder::EncodingTable;
use crate::vcdiff::header::FileHeader;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Default target bytes per window.
pub const DEFAULT_CHUNK_SIZE: usize = 1 << 20;
/// Default shortest match worth a COPY.
pub const DEFAULT_MIN_MATCH: usize = 32;
/// Largest window the format can describe.
pub const MAX_CHUNK_SIZE: usize = (i32::MAX as usize) / 2;

/// Configuration for `VcEncoder`.
#[derive(Debug, Clone)]
pub struct EncodeOptions {
    /// Put each window's sections in one interleaved stream.
    pub interleaved: bool,
    /// Emit an Adler-32 of every window.
    pub checksum: bool,
    /// Target bytes per window.
    pub chunk_size: usize,
    /// Dictionary block size for the hash index.
    pub block_size: usize,
    /// Shortest match emitted as COPY.
    pub min_match: usize,
    /// Ship and use a custom code table.
    pub code_table: Option<CustomCodeTable>,
    /// Opaque bytes placed in the file header.
    pub app_header: Option<Vec<u8>>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            interleaved: false,
            checksum: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            block_size: DEFAULT_BLOCK_SIZE,
            min_match: DEFAULT_MIN_MATCH,
            code_table: None,
            app_header: None,
        }
    }
}

impl EncodeOptions {
    pub fn validate(&self) -> Result<()> {
        if self.block_size < 2 {
            return Err(VcdiffError::InvalidOptions(format!(
                "block size must be at least 2, got {}",
                self.block_size
            )));
        }
        if self.min_match < self.block_size {
            return Err(VcdiffError::InvalidOptions(format!(
                "minimum match {} is smaller than block size {}",
                self.min_match, self.block_size
            )));
        }
        if self.chunk_size == 0 {
            return Err(VcdiffError::InvalidOptions("chunk size must be non-zero".into()));
        }
        if self.chunk_size > MAX_CHUNK_SIZE {
            return Err(VcdiffError::InvalidOptions(format!(
                "chunk size {} exceeds {MAX_CHUNK_SIZE}",
                self.chunk_size
            )));
        }
        Ok(())
    }

    /// Whether the stream needs the 'S' version byte.
    #[inline]
    pub fn is_extended(&self) -> bool {
        self.interleaved || self.checksum
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Result of a completed encode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeSummary {
    pub windows: u64,
    /// Delta bytes written, header included.
    pub bytes_written: u64,
    pub target_bytes: u64,
    pub copied_bytes: u64,
    /// Adler-32 of the whole target, when checksums are on.
    pub target_adler32: Option<u32>,
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

/// Delta encoder over a dictionary and a target.
pub struct VcEncoder<D, T> {
    dictionary: D,
    target: T,
    options: EncodeOptions,
}

impl<D: ByteBuffer, T: ByteBuffer> VcEncoder<D, T> {
    pub fn new(dictionary: D, target: T, options: EncodeOptions) -> Self {
        Self {
            dictionary,
            target,
            options,
        }
    }

    pub fn options(&self) -> &EncodeOptions {
        &self.options
    }

    /// Encode the whole target into `out`.
    pub fn encode<W: Write + ?Sized>(&mut self, out: &mut W) -> Result<EncodeSummary> {
        let opts = &self.options;
        opts.validate()?;
        if self.dictionary.is_empty() {
            return Err(VcdiffError::invalid("dictionary is empty"));
        }
        if self.target.is_empty() {
            return Err(VcdiffError::invalid("target is empty"));
        }
        if self.dictionary.len() > i32::MAX as usize {
            return Err(VcdiffError::unsupported(format!(
                "dictionary of {} bytes exceeds the format limit",
                self.dictionary.len()
            )));
        }

        let (codes, table_payload) = match &opts.code_table {
            Some(custom) => (
                EncodingTable::new(custom.table().clone(), custom.near(), custom.same())?,
                Some(custom.encode()?),
            ),
            None => (EncodingTable::default(), None),
        };

        let mut header = FileHeader::new(opts.is_extended());
        if let Some(payload) = table_payload {
            header = header.with_code_table(payload);
        }
        if let Some(app) = &opts.app_header {
            header = header.with_app_header(app.clone());
        }

        self.dictionary.buffer_all()?;
        let dictionary = self
            .dictionary
            .as_slice()
            .ok_or_else(|| VcdiffError::invalid("dictionary is not resident"))?;
        let index = BlockHash::build(dictionary, opts.block_size)?;
        let chunker = ChunkEncoder::new(&index, &codes, opts.min_match, opts.interleaved, opts.checksum);

        let mut out = CountingWriter::new(out);
        header.write(&mut out)?;

        let mut summary = EncodeSummary::default();
        self.target.set_position(0)?;
        loop {
            let chunk = self.target.read_available(opts.chunk_size)?;
            if chunk.is_empty() {
                break;
            }
            let stats = chunker.encode_chunk(&chunk, &mut out)?;
            summary.windows += 1;
            summary.target_bytes += chunk.len() as u64;
            summary.copied_bytes += stats.copied as u64;
            if let Some(sum) = stats.checksum {
                summary.target_adler32 = Some(match summary.target_adler32 {
                    Some(prev) => adler32_combine(prev, sum, chunk.len() as u64),
                    None => sum,
                });
            }
        }
        out.flush()?;
        summary.bytes_written = out.count;

        debug!(
            "encoded {} target bytes into {} windows, {} delta bytes",
            summary.target_bytes, summary.windows, summary.bytes_written
        );
        Ok(summary)
    }

    pub fn into_inner(self) -> (D, T) {
        (self.dictionary, self.target)
    }
}

/// Counts bytes on their way to the sink.
struct CountingWriter<'w, W: ?Sized> {
    inner: &'w mut W,
    count: u64,
}

impl<'w, W: Write + ?Sized> CountingWriter<'w, W> {
    fn new(inner: &'w mut W) -> Self {
        Self { inner, count: 0 }
    }
}

impl<W: Write + ?Sized> Write for CountingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::SliceBuffer;
    use crate::checksum::adler32;

    fn encode(dict: &[u8], target: &[u8], opts: EncodeOptions) -> Result<(Vec<u8>, EncodeSummary)> {
        let mut out = Vec::new();
        let summary = VcEncoder::new(SliceBuffer::new(dict), SliceBuffer::new(target), opts).encode(&mut out)?;
        Ok((out, summary))
    }

    #[test]
    fn default_options() {
        let o = EncodeOptions::default();
        assert!(!o.interleaved);
        assert!(!o.checksum);
        assert_eq!(o.chunk_size, 1 << 20);
        assert_eq!(o.block_size, 16);
        assert_eq!(o.min_match, 32);
        assert!(o.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let bad = [
            EncodeOptions { block_size: 1, min_match: 1, ..Default::default() },
            EncodeOptions { min_match: 8, ..Default::default() },
            EncodeOptions { chunk_size: 0, ..Default::default() },
        ];
        for o in bad {
            assert!(matches!(o.validate(), Err(VcdiffError::InvalidOptions(_))), "{o:?}");
        }
    }

    #[test]
    fn magic_reflects_format() {
        let dict = b"0123456789abcdef0123456789abcdef";
        let (plain, _) = encode(dict, b"hello", EncodeOptions::default()).unwrap();
        assert_eq!(&plain[..5], &[0xD6, 0xC3, 0xC4, 0x00, 0x00]);
        let (ext, _) = encode(dict, b"hello", EncodeOptions { checksum: true, ..Default::default() }).unwrap();
        assert_eq!(&ext[..5], &[0xD6, 0xC3, 0xC4, b'S', 0x00]);
        let (ext, _) = encode(dict, b"hello", EncodeOptions { interleaved: true, ..Default::default() }).unwrap();
        assert_eq!(&ext[..5], &[0xD6, 0xC3, 0xC4, b'S', 0x00]);
    }

    #[test]
    fn empty_inputs_are_errors() {
        assert!(encode(b"", b"target", EncodeOptions::default()).is_err());
        assert!(encode(b"dictionary", b"", EncodeOptions::default()).is_err());
    }

    #[test]
    fn summary_counts_everything() {
        let dict: Vec<u8> = (0..4096u32).map(|i| (i * 7 % 251) as u8).collect();
        let target = [&dict[100..1100], b"new tail".as_slice()].concat();
        let opts = EncodeOptions {
            chunk_size: 300,
            checksum: true,
            ..Default::default()
        };
        let (out, summary) = encode(&dict, &target, opts).unwrap();
        assert_eq!(summary.windows, 4);
        assert_eq!(summary.bytes_written, out.len() as u64);
        assert_eq!(summary.target_bytes, target.len() as u64);
        assert_eq!(summary.target_adler32, Some(adler32(&target)));
        assert!(out.len() < target.len() / 4);
    }

    #[test]
    fn custom_table_sets_header_flag() {
        let custom = CustomCodeTable::new(crate::vcdiff::CodeTable::rfc3284(), 4, 3).unwrap();
        let opts = EncodeOptions {
            code_table: Some(custom),
            ..Default::default()
        };
        let (out, _) = encode(b"some dictionary text", b"some target", opts).unwrap();
        assert_eq!(out[4], 0x02);
    }
}
