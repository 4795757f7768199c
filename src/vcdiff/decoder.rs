// VCDIFF decoding: opcode stream and window reconstruction.
//
// `InstructionDecoder` turns the instructions section into a stream of
// (type, size, mode) triples, remembering the second half of a fused
// opcode between calls.  `BodyDecoder` applies those instructions to
// rebuild one window of target data from the dictionary.
//
// Every read that can run out of input either completes or leaves its
// buffer untouched and returns EOD, so interleaved windows can be decoded
// from input that arrives piecemeal.

use log::trace;

use super::address_cache::AddressCache;
use super::code_table::{CodeTable, VCD_ADD, VCD_COPY, VCD_NOOP, VCD_RUN, inst_name};
use super::varint;
use super::window::WindowDecoder;
use crate::buffer::{ByteBuffer, SliceBuffer};
use crate::checksum::adler32;
use crate::error::{Result, VcdiffError};

// ---------------------------------------------------------------------------
// Instruction decoder
// ---------------------------------------------------------------------------

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub inst: u8,
    pub size: usize,
    pub mode: u8,
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.inst == VCD_COPY {
            write!(f, "{} {} mode {}", inst_name(self.inst), self.size, self.mode)
        } else {
            write!(f, "{} {}", inst_name(self.inst), self.size)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pending {
    inst: u8,
    size: u8,
    mode: u8,
}

/// Reads opcodes against a code table.
#[derive(Debug, Clone)]
pub struct InstructionDecoder<'t> {
    table: &'t CodeTable,
    pending: Option<Pending>,
}

impl<'t> InstructionDecoder<'t> {
    pub fn new(table: &'t CodeTable) -> Self {
        Self {
            table,
            pending: None,
        }
    }

    /// Drop any half-consumed fused opcode.
    pub fn reset(&mut self) {
        self.pending = None;
    }

    /// Decode the next non-NOOP instruction from `buf`.
    ///
    /// On EOD both the buffer offset and the pending second half are
    /// restored, so the call can be repeated once more bytes arrive.
    pub fn next<B: ByteBuffer + ?Sized>(&mut self, buf: &mut B) -> Result<Instruction> {
        let start = buf.position();
        let saved = self.pending;
        let decoded = self.next_inner(buf);
        if matches!(decoded, Err(VcdiffError::Eod)) {
            buf.set_position(start)?;
            self.pending = saved;
        }
        decoded
    }

    fn next_inner<B: ByteBuffer + ?Sized>(&mut self, buf: &mut B) -> Result<Instruction> {
        loop {
            let half = match self.pending.take() {
                Some(p) => p,
                None => {
                    let op = buf.read_byte()?;
                    let e = self.table.entry(op);
                    if e.inst2 != VCD_NOOP {
                        self.pending = Some(Pending {
                            inst: e.inst2,
                            size: e.size2,
                            mode: e.mode2,
                        });
                    }
                    Pending {
                        inst: e.inst1,
                        size: e.size1,
                        mode: e.mode1,
                    }
                }
            };
            if half.inst == VCD_NOOP {
                continue;
            }
            if half.inst > VCD_COPY {
                return Err(VcdiffError::invalid(format!(
                    "instruction type {} in code table",
                    half.inst
                )));
            }
            let size = if half.size == 0 {
                varint::parse_i32(buf)? as usize
            } else {
                half.size as usize
            };
            return Ok(Instruction {
                inst: half.inst,
                size,
                mode: half.mode,
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Body decoder
// ---------------------------------------------------------------------------

/// Upper bound on the up-front target allocation; a declared length is
/// untrusted until the window actually produces it.
const MAX_RESERVE: usize = 1 << 24;

/// Rebuilds window targets from a dictionary.
pub struct BodyDecoder<'a> {
    dictionary: &'a [u8],
    instructions: InstructionDecoder<'a>,
    cache: AddressCache,
    target: Vec<u8>,
    /// Target length and source segment of the current window.
    target_length: usize,
    source: (usize, usize),
}

impl<'a> BodyDecoder<'a> {
    pub fn new(dictionary: &'a [u8], table: &'a CodeTable, near: u8, same: u8) -> Self {
        Self {
            dictionary,
            instructions: InstructionDecoder::new(table),
            cache: AddressCache::new(near, same),
            target: Vec::new(),
            target_length: 0,
            source: (0, 0),
        }
    }

    fn begin(&mut self, window: &WindowDecoder) {
        self.cache.reset();
        self.instructions.reset();
        self.target.clear();
        self.target.reserve(window.target_length().min(MAX_RESERVE));
        self.target_length = window.target_length();
        self.source = (window.source_position(), window.source_length());
    }

    /// Decode a window whose sections were read by `WindowDecoder`.
    pub fn decode(&mut self, window: &WindowDecoder) -> Result<&[u8]> {
        self.begin(window);
        let mut data = SliceBuffer::new(window.data());
        let mut inst = SliceBuffer::new(window.instructions());
        let mut addr = SliceBuffer::new(window.addresses());

        while self.target.len() < self.target_length && inst.can_read() {
            let i = self.instructions.next(&mut inst)?;
            self.check_fits(i)?;
            match i.inst {
                VCD_COPY => self.apply_copy(i, &mut addr)?,
                _ => self.apply_literal(i, &mut data)?,
            }
        }
        if self.target.len() < self.target_length {
            return Err(VcdiffError::Eod);
        }
        self.verify(window)?;
        Ok(&self.target)
    }

    /// Decode an interleaved window, pulling its payload from `delta`.
    ///
    /// Bytes are taken with `read_available`, so a delta that is still
    /// growing is consumed as far as it goes.  Leftover bytes of a partly
    /// decoded instruction are carried into the next pull.  If the payload
    /// runs dry before the target is complete the result is EOD.
    pub fn decode_interleaved<B: ByteBuffer + ?Sized>(
        &mut self,
        window: &WindowDecoder,
        delta: &mut B,
    ) -> Result<&[u8]> {
        self.begin(window);
        let mut owed = window.interleaved_length();
        let mut carried: Vec<u8> = Vec::new();
        let mut stalled: Option<Instruction> = None;

        while self.target.len() < self.target_length {
            let mut cur = SliceBuffer::new(&carried);
            while self.target.len() < self.target_length {
                let i = match stalled.take() {
                    Some(i) => i,
                    None => match self.instructions.next(&mut cur) {
                        Ok(i) => i,
                        Err(VcdiffError::Eod) => break,
                        Err(e) => return Err(e),
                    },
                };
                self.check_fits(i)?;
                let applied = match i.inst {
                    VCD_COPY => self.apply_copy(i, &mut cur),
                    _ => self.apply_literal(i, &mut cur),
                };
                match applied {
                    Ok(()) => {}
                    Err(VcdiffError::Eod) => {
                        stalled = Some(i);
                        break;
                    }
                    Err(e) => return Err(e),
                }
            }
            let consumed = cur.position();
            carried.drain(..consumed);

            if self.target.len() >= self.target_length {
                break;
            }
            if owed == 0 {
                return Err(VcdiffError::invalid(
                    "interleaved section ended before the target was complete",
                ));
            }
            let more = delta.read_available(owed)?;
            if more.is_empty() {
                return Err(VcdiffError::Eod);
            }
            trace!("pulled {} interleaved bytes, {} still owed", more.len(), owed - more.len());
            owed -= more.len();
            carried.extend_from_slice(&more);
        }

        if owed > 0 {
            delta.skip(owed)?;
        }
        self.verify(window)?;
        Ok(&self.target)
    }

    /// Bytes of the current window produced so far.
    #[inline]
    pub fn decoded(&self) -> usize {
        self.target.len()
    }

    fn check_fits(&self, i: Instruction) -> Result<()> {
        let room = self.target_length - self.target.len();
        if i.size > room {
            return Err(VcdiffError::invalid(format!(
                "{i} overruns the target window by {} bytes",
                i.size - room
            )));
        }
        Ok(())
    }

    fn apply_literal<B: ByteBuffer + ?Sized>(&mut self, i: Instruction, data: &mut B) -> Result<()> {
        match i.inst {
            VCD_ADD => {
                let bytes = data.read_bytes(i.size)?;
                self.target.extend_from_slice(&bytes);
            }
            VCD_RUN => {
                let byte = data.read_byte()?;
                self.target.resize(self.target.len() + i.size, byte);
            }
            other => {
                return Err(VcdiffError::invalid(format!(
                    "unexpected instruction type {other}"
                )));
            }
        }
        Ok(())
    }

    fn apply_copy<B: ByteBuffer + ?Sized>(&mut self, i: Instruction, addr: &mut B) -> Result<()> {
        let (position, length) = self.source;
        let here = (length + self.target.len()) as u64;
        let address = self.cache.decode(here, i.mode, addr)? as usize;
        let end = address.checked_add(i.size).filter(|&e| e <= length);
        let Some(end) = end else {
            return Err(VcdiffError::unsupported(format!(
                "COPY of {} bytes at {address} reaches past the {length}-byte source segment",
                i.size
            )));
        };
        let src = self
            .dictionary
            .get(position + address..position + end)
            .ok_or_else(|| VcdiffError::invalid("source segment outside dictionary"))?;
        self.target.extend_from_slice(src);
        Ok(())
    }

    fn verify(&self, window: &WindowDecoder) -> Result<()> {
        if let Some(expected) = window.checksum() {
            let actual = adler32(&self.target);
            if actual != expected {
                return Err(VcdiffError::ChecksumMismatch { expected, actual });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
