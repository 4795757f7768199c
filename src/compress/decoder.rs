// Streaming delta decoder.
//
// `VcDecoder` reads the file header once in `start()` and then reconstructs
// every window in the delta, writing each window to the sink only after it
// has been fully rebuilt and its checksum (if any) verified.

use std::io::Write;

use log::debug;

use super::custom_table::CustomCodeTable;
use crate::buffer::ByteBuffer;
use crate::error::{Result, VcdiffError};
use crate::vcdiff::address_cache::{DEFAULT_NEAR, DEFAULT_SAME};
use crate::vcdiff::code_table::CodeTable;
use crate::vcdiff::decoder::BodyDecoder;
use crate::vcdiff::header::{FileHeader, HeaderFlags};
use crate::vcdiff::window::WindowDecoder;

/// Delta decoder over a dictionary and a delta stream.
pub struct VcDecoder<D, T> {
    dictionary: D,
    delta: T,
    header: Option<FileHeader>,
    custom: Option<CustomCodeTable>,
    allow_code_table: bool,
    bytes_written: u64,
    windows: u64,
}

impl<D: ByteBuffer, T: ByteBuffer> VcDecoder<D, T> {
    pub fn new(dictionary: D, delta: T) -> Self {
        Self {
            dictionary,
            delta,
            header: None,
            custom: None,
            allow_code_table: true,
            bytes_written: 0,
            windows: 0,
        }
    }

    /// Decoder for a code-table sub-stream, which may not nest another table.
    pub(crate) fn nested(dictionary: D, delta: T) -> Self {
        Self {
            allow_code_table: false,
            ..Self::new(dictionary, delta)
        }
    }

    /// Parse the file header and load the dictionary.
    pub fn start(&mut self) -> Result<()> {
        let header = FileHeader::parse(&mut self.delta)?;
        if let Some(payload) = header.code_table.as_deref() {
            if !self.allow_code_table {
                return Err(VcdiffError::invalid("nested custom code table"));
            }
            self.custom = Some(CustomCodeTable::decode(payload)?);
        }
        if header.flags.contains(HeaderFlags::APPHEADER) {
            debug!(
                "application header of {} bytes",
                header.app_header.as_ref().map_or(0, Vec::len)
            );
        }
        self.dictionary.buffer_all()?;
        self.header = Some(header);
        Ok(())
    }

    /// Decode every remaining window into `out`.  Returns the total number
    /// of bytes written so far.
    pub fn decode<W: Write + ?Sized>(&mut self, out: &mut W) -> Result<u64> {
        let extended = match &self.header {
            Some(h) => h.is_extended(),
            None => return Err(VcdiffError::invalid("decode called before start")),
        };
        if !self.delta.can_read() {
            return Err(VcdiffError::Eod);
        }

        let dictionary = self
            .dictionary
            .as_slice()
            .ok_or_else(|| VcdiffError::invalid("dictionary is not resident"))?;
        let default_table;
        let (table, near, same) = match &self.custom {
            Some(c) => (c.table(), c.near(), c.same()),
            None => {
                default_table = CodeTable::rfc3284();
                (&default_table, DEFAULT_NEAR, DEFAULT_SAME)
            }
        };
        let mut body = BodyDecoder::new(dictionary, table, near, same);

        while self.delta.can_read() {
            let window_start = self.delta.position();
            let window = WindowDecoder::decode(&mut self.delta, dictionary.len(), extended)?;
            let decoded = if window.is_interleaved() {
                body.decode_interleaved(&window, &mut self.delta)
            } else {
                body.decode(&window)
            };
            let target = match decoded {
                Ok(t) => t,
                Err(e) => {
                    if e.is_eod() {
                        self.delta.set_position(window_start)?;
                    }
                    return Err(e);
                }
            };
            out.write_all(target)?;
            self.bytes_written += target.len() as u64;
            self.windows += 1;
            debug!("decoded window {} ({} bytes)", self.windows, target.len());
        }
        out.flush()?;
        Ok(self.bytes_written)
    }

    /// Bytes written by completed windows.
    #[inline]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    #[inline]
    pub fn windows(&self) -> u64 {
        self.windows
    }

    /// `true` once `start` has seen the 'S' version byte.
    pub fn is_extended(&self) -> bool {
        self.header.as_ref().is_some_and(FileHeader::is_extended)
    }

    pub fn header(&self) -> Option<&FileHeader> {
        self.header.as_ref()
    }

    pub fn app_header(&self) -> Option<&[u8]> {
        self.header.as_ref().and_then(|h| h.app_header.as_deref())
    }

    pub fn custom_table(&self) -> Option<&CustomCodeTable> {
        self.custom.as_ref()
    }

    pub fn into_inner(self) -> (D, T) {
        (self.dictionary, self.delta)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::SliceBuffer;
    use crate::compress::encoder::{EncodeOptions, VcEncoder};

    const DICT: &[u8] = b"Alpha bravo charlie delta echo foxtrot golf hotel india juliett kilo lima";

    fn encode(target: &[u8], opts: EncodeOptions) -> Vec<u8> {
        let mut out = Vec::new();
        VcEncoder::new(SliceBuffer::new(DICT), SliceBuffer::new(target), opts)
            .encode(&mut out)
            .unwrap();
        out
    }

    fn small_blocks() -> EncodeOptions {
        EncodeOptions {
            block_size: 4,
            min_match: 8,
            ..EncodeOptions::default()
        }
    }

    #[test]
    fn decode_before_start_is_an_error() {
        let delta = encode(b"charlie delta", small_blocks());
        let mut dec = VcDecoder::new(SliceBuffer::new(DICT), SliceBuffer::new(&delta));
        assert!(matches!(dec.decode(&mut Vec::new()), Err(VcdiffError::Invalid(_))));
    }

    #[test]
    fn header_only_is_eod() {
        let delta = [0xD6, 0xC3, 0xC4, 0x00, 0x00];
        let mut dec = VcDecoder::new(SliceBuffer::new(DICT), SliceBuffer::new(&delta));
        dec.start().unwrap();
        assert!(dec.decode(&mut Vec::new()).unwrap_err().is_eod());
        assert_eq!(dec.bytes_written(), 0);
    }

    #[test]
    fn multi_window_roundtrip() {
        let target = b"kilo lima charlie delta echo, then india juliett kilo lima alpha!";
        let opts = EncodeOptions {
            chunk_size: 20,
            ..small_blocks()
        };
        let delta = encode(target, opts);
        let mut dec = VcDecoder::new(SliceBuffer::new(DICT), SliceBuffer::new(&delta));
        dec.start().unwrap();
        let mut out = Vec::new();
        assert_eq!(dec.decode(&mut out).unwrap(), target.len() as u64);
        assert_eq!(out, target);
        assert_eq!(dec.windows(), 4);
        assert!(!dec.is_extended());
    }

    #[test]
    fn bytes_written_counts_completed_windows_on_failure() {
        let target = b"charlie delta echo foxtrot golf hotel";
        let opts = EncodeOptions {
            chunk_size: 16,
            checksum: true,
            ..small_blocks()
        };
        let mut delta = encode(target, opts);
        // Damage the last byte, which belongs to the final window.
        let last = delta.len() - 1;
        delta[last] ^= 0xFF;
        let mut dec = VcDecoder::new(SliceBuffer::new(DICT), SliceBuffer::new(&delta));
        dec.start().unwrap();
        let mut out = Vec::new();
        assert!(dec.decode(&mut out).is_err());
        assert_eq!(dec.bytes_written(), 32);
        assert_eq!(out, &target[..32]);
    }

    #[test]
    fn app_header_is_exposed() {
        let opts = EncodeOptions {
            app_header: Some(b"dict-id:42".to_vec()),
            ..small_blocks()
        };
        let delta = encode(b"echo foxtrot golf", opts);
        let mut dec = VcDecoder::new(SliceBuffer::new(DICT), SliceBuffer::new(&delta));
        dec.start().unwrap();
        assert_eq!(dec.app_header(), Some(&b"dict-id:42"[..]));
        let mut out = Vec::new();
        dec.decode(&mut out).unwrap();
        assert_eq!(out, b"echo foxtrot golf");
    }

    #[test]
    fn truncated_window_rewinds_delta() {
        let delta = encode(b"golf hotel india juliett", small_blocks());
        let cut = &delta[..delta.len() - 2];
        let mut dec = VcDecoder::new(SliceBuffer::new(DICT), SliceBuffer::new(cut));
        dec.start().unwrap();
        assert!(dec.decode(&mut Vec::new()).unwrap_err().is_eod());
        let (_, delta_buf) = dec.into_inner();
        assert_eq!(delta_buf.position(), 5);
    }
}
