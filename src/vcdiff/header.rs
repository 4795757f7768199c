// VCDIFF file header and per-window header layout (RFC 3284, Section 4).
//
// File header:   D6 C3 C4 <version> <hdr_ind> [code table] [app header]
// Window header: <win_ind> [src len] [src pos] <delta len> <target len>
//                <del_ind> <data len> <inst len> <addr len> [adler32]
//
// Version 0x00 is plain RFC 3284.  Version 'S' is the SDCH extended format,
// which adds interleaved sections and the Adler-32 varint after the three
// section lengths.

use std::io::{self, Write};

use bitflags::bitflags;

use super::varint;
use crate::buffer::ByteBuffer;
use crate::error::{Result, VcdiffError};

// ---------------------------------------------------------------------------
// Magic and versions
// ---------------------------------------------------------------------------

pub const VCDIFF_MAGIC: [u8; 3] = [0xD6, 0xC3, 0xC4];
pub const VERSION_STANDARD: u8 = 0x00;
pub const VERSION_EXTENDED: u8 = b'S';

// ---------------------------------------------------------------------------
// Indicator flags
// ---------------------------------------------------------------------------

bitflags! {
    /// `hdr_ind`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HeaderFlags: u8 {
        /// Sections are secondary-compressed.
        const DECOMPRESS = 0x01;
        /// A custom code table follows.
        const CODETABLE = 0x02;
        /// Application-defined bytes follow.
        const APPHEADER = 0x04;
    }

    /// `win_ind`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WindowFlags: u8 {
        const SOURCE = 0x01;
        const TARGET = 0x02;
        const CHECKSUM = 0x04;
    }

    /// `del_ind`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DeltaFlags: u8 {
        const DATACOMP = 0x01;
        const INSTCOMP = 0x02;
        const ADDRCOMP = 0x04;
    }
}

// ---------------------------------------------------------------------------
// File header
// ---------------------------------------------------------------------------

/// Parsed or to-be-written file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u8,
    pub flags: HeaderFlags,
    /// `[near][same][nested delta]` when `CODETABLE` is set.
    pub code_table: Option<Vec<u8>>,
    pub app_header: Option<Vec<u8>>,
}

impl FileHeader {
    pub fn new(extended: bool) -> Self {
        Self {
            version: if extended {
                VERSION_EXTENDED
            } else {
                VERSION_STANDARD
            },
            flags: HeaderFlags::empty(),
            code_table: None,
            app_header: None,
        }
    }

    #[inline]
    pub fn is_extended(&self) -> bool {
        self.version == VERSION_EXTENDED
    }

    pub fn with_code_table(mut self, payload: Vec<u8>) -> Self {
        self.flags |= HeaderFlags::CODETABLE;
        self.code_table = Some(payload);
        self
    }

    pub fn with_app_header(mut self, data: Vec<u8>) -> Self {
        self.flags |= HeaderFlags::APPHEADER;
        self.app_header = Some(data);
        self
    }

    /// Emit the header.
    pub fn write<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&VCDIFF_MAGIC)?;
        w.write_all(&[self.version, self.flags.bits()])?;
        if self.flags.contains(HeaderFlags::CODETABLE) {
            let data = self.code_table.as_deref().unwrap_or_default();
            varint::write_u64(w, data.len() as u64)?;
            w.write_all(data)?;
        }
        if self.flags.contains(HeaderFlags::APPHEADER) {
            let data = self.app_header.as_deref().unwrap_or_default();
            varint::write_u64(w, data.len() as u64)?;
            w.write_all(data)?;
        }
        Ok(())
    }

    /// Parse a file header.
    ///
    /// A short header is EOD and leaves the buffer where it was.  Bad magic,
    /// an unknown version or unknown flag bits are errors, and the
    /// secondary-compression flag is rejected as unsupported.
    pub fn parse<B: ByteBuffer + ?Sized>(buf: &mut B) -> Result<Self> {
        let start = buf.position();
        let parsed = Self::parse_inner(buf);
        if matches!(parsed, Err(VcdiffError::Eod)) {
            buf.set_position(start)?;
        }
        parsed
    }

    fn parse_inner<B: ByteBuffer + ?Sized>(buf: &mut B) -> Result<Self> {
        let mut fixed = [0u8; 5];
        buf.peek_into(&mut fixed)?;
        if fixed[..3] != VCDIFF_MAGIC {
            return Err(VcdiffError::invalid(format!(
                "bad magic {:02X} {:02X} {:02X}",
                fixed[0], fixed[1], fixed[2]
            )));
        }
        let version = fixed[3];
        if version != VERSION_STANDARD && version != VERSION_EXTENDED {
            return Err(VcdiffError::unsupported(format!("version byte {version:#04x}")));
        }
        let flags = HeaderFlags::from_bits(fixed[4]).ok_or_else(|| {
            VcdiffError::invalid(format!("unknown header indicator bits {:#04x}", fixed[4]))
        })?;
        if flags.contains(HeaderFlags::DECOMPRESS) {
            return Err(VcdiffError::unsupported("secondary compression"));
        }
        buf.skip(5)?;

        let code_table = if flags.contains(HeaderFlags::CODETABLE) {
            let len = varint::parse_len(buf)?;
            if len == 0 {
                return Err(VcdiffError::invalid("custom code table length is zero"));
            }
            Some(buf.read_bytes(len)?)
        } else {
            None
        };

        let app_header = if flags.contains(HeaderFlags::APPHEADER) {
            let len = varint::parse_len(buf)?;
            Some(buf.read_bytes(len)?)
        } else {
            None
        };

        Ok(Self {
            version,
            flags,
            code_table,
            app_header,
        })
    }
}

// ---------------------------------------------------------------------------
// Window header
// ---------------------------------------------------------------------------

/// Per-window header fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowHeader {
    pub win_ind: WindowFlags,
    pub source_length: u64,
    pub source_position: u64,
    /// Bytes following the delta-length field.
    pub delta_length: u64,
    pub target_length: u64,
    pub del_ind: u8,
    pub data_length: u64,
    pub inst_length: u64,
    pub addr_length: u64,
    pub checksum: Option<u32>,
}

impl WindowHeader {
    #[inline]
    pub fn has_source(&self) -> bool {
        self.win_ind.contains(WindowFlags::SOURCE)
    }

    /// Delta length implied by the other fields.
    pub fn compute_delta_length(&self) -> u64 {
        let mut len = varint::calc_length(self.target_length) as u64;
        len += 1; // del_ind
        len += varint::calc_length(self.data_length) as u64;
        len += varint::calc_length(self.inst_length) as u64;
        len += varint::calc_length(self.addr_length) as u64;
        if let Some(sum) = self.checksum {
            len += varint::calc_length(u64::from(sum)) as u64;
        }
        len + self.data_length + self.inst_length + self.addr_length
    }

    /// Emit everything up to, but not including, the section payloads.
    pub fn write<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&[self.win_ind.bits()])?;
        if self.win_ind.intersects(WindowFlags::SOURCE | WindowFlags::TARGET) {
            varint::write_u64(w, self.source_length)?;
            varint::write_u64(w, self.source_position)?;
        }
        varint::write_u64(w, self.delta_length)?;
        varint::write_u64(w, self.target_length)?;
        w.write_all(&[self.del_ind])?;
        varint::write_u64(w, self.data_length)?;
        varint::write_u64(w, self.inst_length)?;
        varint::write_u64(w, self.addr_length)?;
        if let Some(sum) = self.checksum {
            varint::write_u64(w, u64::from(sum))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::SliceBuffer;

    #[test]
    fn plain_header_bytes() {
        let mut out = Vec::new();
        FileHeader::new(false).write(&mut out).unwrap();
        assert_eq!(out, vec![0xD6, 0xC3, 0xC4, 0x00, 0x00]);
        let mut out = Vec::new();
        FileHeader::new(true).write(&mut out).unwrap();
        assert_eq!(out, vec![0xD6, 0xC3, 0xC4, b'S', 0x00]);
    }

    #[test]
    fn header_roundtrip_with_extras() {
        let hdr = FileHeader::new(true)
            .with_code_table(vec![4, 3, 0xD6])
            .with_app_header(b"sdch".to_vec());
        let mut out = Vec::new();
        hdr.write(&mut out).unwrap();
        assert_eq!(out[4], 0x06);
        let parsed = FileHeader::parse(&mut SliceBuffer::new(&out)).unwrap();
        assert_eq!(parsed, hdr);
        assert!(parsed.is_extended());
    }

    #[test]
    fn short_header_is_eod() {
        let data = [0xD6, 0xC3, 0xC4, 0x00];
        let mut b = SliceBuffer::new(&data);
        assert!(FileHeader::parse(&mut b).unwrap_err().is_eod());
        assert_eq!(b.position(), 0);
    }

    #[test]
    fn rejects_bad_magic_version_and_flags() {
        let bad_magic = [0xD6, 0xC3, 0xC5, 0x00, 0x00];
        assert!(matches!(
            FileHeader::parse(&mut SliceBuffer::new(&bad_magic)),
            Err(VcdiffError::Invalid(_))
        ));
        let bad_version = [0xD6, 0xC3, 0xC4, 0x01, 0x00];
        assert!(FileHeader::parse(&mut SliceBuffer::new(&bad_version)).is_err());
        let secondary = [0xD6, 0xC3, 0xC4, 0x00, 0x01];
        assert!(matches!(
            FileHeader::parse(&mut SliceBuffer::new(&secondary)),
            Err(VcdiffError::Unsupported(_))
        ));
        let unknown = [0xD6, 0xC3, 0xC4, 0x00, 0x08];
        assert!(FileHeader::parse(&mut SliceBuffer::new(&unknown)).is_err());
    }

    #[test]
    fn zero_length_code_table_is_invalid() {
        let data = [0xD6, 0xC3, 0xC4, b'S', 0x02, 0x00];
        assert!(matches!(
            FileHeader::parse(&mut SliceBuffer::new(&data)),
            Err(VcdiffError::Invalid(_))
        ));
    }

    #[test]
    fn delta_length_counts_everything_after_field() {
        let wh = WindowHeader {
            win_ind: WindowFlags::SOURCE | WindowFlags::CHECKSUM,
            source_length: 100,
            source_position: 0,
            delta_length: 0,
            target_length: 300,
            del_ind: 0,
            data_length: 6,
            inst_length: 3,
            addr_length: 1,
            checksum: Some(0x1234_5678),
        };
        // target(2) + del_ind(1) + lengths(3) + checksum(5) + payload(10)
        assert_eq!(wh.compute_delta_length(), 21);
        let wh = WindowHeader {
            delta_length: wh.compute_delta_length(),
            ..wh
        };
        let mut out = Vec::new();
        wh.write(&mut out).unwrap();
        // win_ind, src len(1), src pos(1), delta len(1), then 11 header bytes
        assert_eq!(out.len(), 4 + 11);
        assert_eq!(out[0], 0x05);
    }
}
