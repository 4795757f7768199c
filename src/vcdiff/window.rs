// Window header parsing and section extraction.
//
// A window is parsed in one step from the delta buffer.  For the usual
// layout the three sections are copied out of the buffer; for an
// interleaved window (extended format, everything in the instructions
// section) the payload is left in the buffer so the body decoder can pull
// it incrementally.  Any EOD while parsing rewinds to the window start.

use log::trace;

use super::header::{DeltaFlags, WindowFlags, WindowHeader};
use super::varint;
use crate::buffer::ByteBuffer;
use crate::error::{Result, VcdiffError};

/// How the window body is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionLayout {
    /// Data, instructions and addresses in three sections.
    Separate,
    /// Everything in the instructions section, in instruction order.
    Interleaved,
}

/// One parsed window.
#[derive(Debug, Clone)]
pub struct WindowDecoder {
    header: WindowHeader,
    layout: SectionLayout,
    data: Vec<u8>,
    instructions: Vec<u8>,
    addresses: Vec<u8>,
}

impl WindowDecoder {
    /// Parse the next window from `buf`.
    ///
    /// `dictionary_size` bounds the source segment.  `extended` enables the
    /// checksum field and the interleaved layout.
    pub fn decode<B: ByteBuffer + ?Sized>(
        buf: &mut B,
        dictionary_size: usize,
        extended: bool,
    ) -> Result<Self> {
        let start = buf.position();
        let parsed = Self::decode_inner(buf, dictionary_size as u64, extended);
        if matches!(parsed, Err(VcdiffError::Eod)) {
            buf.set_position(start)?;
        }
        parsed
    }

    fn decode_inner<B: ByteBuffer + ?Sized>(
        buf: &mut B,
        dictionary_size: u64,
        extended: bool,
    ) -> Result<Self> {
        let raw = buf.read_byte()?;
        let win_ind = WindowFlags::from_bits(raw).ok_or_else(|| {
            VcdiffError::invalid(format!("unknown window indicator bits {raw:#04x}"))
        })?;
        if win_ind.contains(WindowFlags::TARGET) {
            return Err(VcdiffError::unsupported("VCD_TARGET source segments"));
        }

        let (source_length, source_position) = if win_ind.contains(WindowFlags::SOURCE) {
            let len = u64::from(varint::parse_i32(buf)?);
            let pos = u64::from(varint::parse_i32(buf)?);
            check_source_segment(len, pos, dictionary_size)?;
            (len, pos)
        } else {
            (0, 0)
        };

        let delta_length = u64::from(varint::parse_i32(buf)?);
        let after_delta_field = buf.position();

        let target_length = u64::from(varint::parse_i32(buf)?);
        let del_ind = buf.read_byte()?;
        if DeltaFlags::from_bits_retain(del_ind).intersects(DeltaFlags::all()) {
            return Err(VcdiffError::unsupported(format!(
                "secondary-compressed sections (del_ind {del_ind:#04x})"
            )));
        }
        if del_ind != 0 {
            return Err(VcdiffError::invalid(format!("unknown delta indicator {del_ind:#04x}")));
        }

        let data_length = u64::from(varint::parse_i32(buf)?);
        let inst_length = u64::from(varint::parse_i32(buf)?);
        let addr_length = u64::from(varint::parse_i32(buf)?);

        let checksum = if extended && win_ind.contains(WindowFlags::CHECKSUM) {
            let sum = varint::parse_i64(buf)?;
            let sum = u32::try_from(sum)
                .map_err(|_| VcdiffError::invalid(format!("checksum {sum:#x} exceeds 32 bits")))?;
            Some(sum)
        } else {
            None
        };

        let header_bytes = (buf.position() - after_delta_field) as u64;
        let declared = header_bytes + data_length + inst_length + addr_length;
        if declared != delta_length {
            return Err(VcdiffError::invalid(format!(
                "delta length {delta_length} does not match window contents ({declared})"
            )));
        }

        let layout = select_layout(extended, data_length, inst_length, addr_length)?;
        let header = WindowHeader {
            win_ind,
            source_length,
            source_position,
            delta_length,
            target_length,
            del_ind,
            data_length,
            inst_length,
            addr_length,
            checksum,
        };

        let (data, instructions, addresses) = match layout {
            SectionLayout::Separate => (
                buf.read_bytes(data_length as usize)?,
                buf.read_bytes(inst_length as usize)?,
                buf.read_bytes(addr_length as usize)?,
            ),
            SectionLayout::Interleaved => (Vec::new(), Vec::new(), Vec::new()),
        };

        trace!(
            "window: source {}@{} target {} sections {}/{}/{} {:?}",
            source_length, source_position, target_length, data_length, inst_length, addr_length, layout
        );

        Ok(Self {
            header,
            layout,
            data,
            instructions,
            addresses,
        })
    }

    #[inline]
    pub fn header(&self) -> &WindowHeader {
        &self.header
    }

    #[inline]
    pub fn layout(&self) -> SectionLayout {
        self.layout
    }

    #[inline]
    pub fn is_interleaved(&self) -> bool {
        self.layout == SectionLayout::Interleaved
    }

    #[inline]
    pub fn target_length(&self) -> usize {
        self.header.target_length as usize
    }

    #[inline]
    pub fn source_length(&self) -> usize {
        self.header.source_length as usize
    }

    #[inline]
    pub fn source_position(&self) -> usize {
        self.header.source_position as usize
    }

    #[inline]
    pub fn has_checksum(&self) -> bool {
        self.header.checksum.is_some()
    }

    #[inline]
    pub fn checksum(&self) -> Option<u32> {
        self.header.checksum
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn instructions(&self) -> &[u8] {
        &self.instructions
    }

    pub fn addresses(&self) -> &[u8] {
        &self.addresses
    }

    /// Size of the interleaved payload still in the delta buffer.
    #[inline]
    pub fn interleaved_length(&self) -> usize {
        match self.layout {
            SectionLayout::Interleaved => self.header.inst_length as usize,
            SectionLayout::Separate => 0,
        }
    }
}

fn check_source_segment(len: u64, pos: u64, dictionary_size: u64) -> Result<()> {
    if len > dictionary_size {
        return Err(VcdiffError::invalid(format!(
            "source segment length {len} exceeds dictionary size {dictionary_size}"
        )));
    }
    if pos > dictionary_size {
        return Err(VcdiffError::invalid(format!(
            "source segment position {pos} exceeds dictionary size {dictionary_size}"
        )));
    }
    if len + pos > dictionary_size {
        return Err(VcdiffError::invalid(format!(
            "source segment {pos}+{len} runs past dictionary end {dictionary_size}"
        )));
    }
    Ok(())
}

fn select_layout(extended: bool, data: u64, inst: u64, addr: u64) -> Result<SectionLayout> {
    if !extended {
        return Ok(SectionLayout::Separate);
    }
    match (data, inst, addr) {
        (0, 1.., 0) => Ok(SectionLayout::Interleaved),
        (_, 1.., _) => Ok(SectionLayout::Separate),
        _ => Err(VcdiffError::invalid(
            "extended window has an empty instructions section",
        )),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::SliceBuffer;

    fn window(win_ind: WindowFlags, checksum: Option<u32>, sections: (&[u8], &[u8], &[u8])) -> Vec<u8> {
        let mut header = WindowHeader {
            win_ind,
            source_length: 8,
            source_position: 2,
            delta_length: 0,
            target_length: 5,
            del_ind: 0,
            data_length: sections.0.len() as u64,
            inst_length: sections.1.len() as u64,
            addr_length: sections.2.len() as u64,
            checksum,
        };
        header.delta_length = header.compute_delta_length();
        let mut out = Vec::new();
        header.write(&mut out).unwrap();
        out.extend_from_slice(sections.0);
        out.extend_from_slice(sections.1);
        out.extend_from_slice(sections.2);
        out
    }

    #[test]
    fn parses_separate_sections() {
        let bytes = window(WindowFlags::SOURCE, None, (b"ab", &[3, 20], &[1]));
        let mut b = SliceBuffer::new(&bytes);
        let w = WindowDecoder::decode(&mut b, 16, false).unwrap();
        assert_eq!(w.layout(), SectionLayout::Separate);
        assert_eq!(w.source_length(), 8);
        assert_eq!(w.source_position(), 2);
        assert_eq!(w.target_length(), 5);
        assert_eq!(w.data(), b"ab");
        assert_eq!(w.instructions(), &[3, 20]);
        assert_eq!(w.addresses(), &[1]);
        assert!(!b.can_read());
    }

    #[test]
    fn interleaved_payload_stays_in_buffer() {
        let bytes = window(
            WindowFlags::SOURCE | WindowFlags::CHECKSUM,
            Some(77),
            (&[], &[6, b'h', b'e', b'l', b'l', b'o'], &[]),
        );
        let mut b = SliceBuffer::new(&bytes);
        let w = WindowDecoder::decode(&mut b, 16, true).unwrap();
        assert!(w.is_interleaved());
        assert_eq!(w.checksum(), Some(77));
        assert_eq!(w.interleaved_length(), 6);
        assert_eq!(b.remaining(), 6);
    }

    #[test]
    fn checksum_bit_carries_no_field_in_standard_version() {
        let bytes = window(WindowFlags::SOURCE | WindowFlags::CHECKSUM, None, (b"a", &[2], &[]));
        let mut b = SliceBuffer::new(&bytes);
        let w = WindowDecoder::decode(&mut b, 16, false).unwrap();
        assert_eq!(w.checksum(), None);
        assert_eq!(w.data(), b"a");
        assert!(!b.can_read());
    }

    #[test]
    fn truncated_window_rewinds() {
        let bytes = window(WindowFlags::SOURCE, None, (b"ab", &[3, 20], &[1]));
        for cut in 0..bytes.len() {
            let mut b = SliceBuffer::new(&bytes[..cut]);
            let err = WindowDecoder::decode(&mut b, 16, false).unwrap_err();
            assert!(err.is_eod(), "cut at {cut}: {err}");
            assert_eq!(b.position(), 0);
        }
    }

    #[test]
    fn rejects_target_flag_and_unknown_bits() {
        let mut bytes = window(WindowFlags::SOURCE, None, (b"a", &[2], &[]));
        bytes[0] = 0x02;
        assert!(matches!(
            WindowDecoder::decode(&mut SliceBuffer::new(&bytes), 16, false),
            Err(VcdiffError::Unsupported(_))
        ));
        bytes[0] = 0x09;
        assert!(matches!(
            WindowDecoder::decode(&mut SliceBuffer::new(&bytes), 16, false),
            Err(VcdiffError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_source_segment_past_dictionary() {
        let bytes = window(WindowFlags::SOURCE, None, (b"a", &[2], &[]));
        // Segment is 2..10, dictionary only 9 bytes.
        assert!(WindowDecoder::decode(&mut SliceBuffer::new(&bytes), 9, false).is_err());
        assert!(WindowDecoder::decode(&mut SliceBuffer::new(&bytes), 7, false).is_err());
        assert!(WindowDecoder::decode(&mut SliceBuffer::new(&bytes), 10, false).is_ok());
    }

    #[test]
    fn rejects_delta_length_mismatch() {
        let mut bytes = window(WindowFlags::SOURCE, None, (b"a", &[2], &[]));
        // Delta length is the fourth byte; bump it by one.
        bytes[3] += 1;
        bytes.push(0);
        assert!(matches!(
            WindowDecoder::decode(&mut SliceBuffer::new(&bytes), 16, false),
            Err(VcdiffError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_compressed_sections() {
        let mut bytes = window(WindowFlags::SOURCE, None, (b"a", &[2], &[]));
        // del_ind follows the one-byte target length.
        bytes[5] = 0x01;
        assert!(WindowDecoder::decode(&mut SliceBuffer::new(&bytes), 16, false).is_err());
    }

    #[test]
    fn window_without_source_segment() {
        let bytes = window(WindowFlags::empty(), None, (b"abcde", &[6], &[]));
        let w = WindowDecoder::decode(&mut SliceBuffer::new(&bytes), 0, false).unwrap();
        assert_eq!(w.source_length(), 0);
        assert_eq!(w.source_position(), 0);
    }

    #[test]
    fn layout_selection() {
        assert_eq!(select_layout(false, 0, 0, 0).unwrap(), SectionLayout::Separate);
        assert_eq!(select_layout(true, 0, 5, 0).unwrap(), SectionLayout::Interleaved);
        assert_eq!(select_layout(true, 1, 5, 0).unwrap(), SectionLayout::Separate);
        assert_eq!(select_layout(true, 0, 5, 1).unwrap(), SectionLayout::Separate);
        assert!(select_layout(true, 3, 0, 0).is_err());
        assert!(select_layout(true, 0, 0, 0).is_err());
    }
}
