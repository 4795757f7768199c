// VCDIFF window encoder: instruction packing and window emission.
//
// Match finding lives in `compress::chunk`; this module only turns a
// sequence of ADD/COPY/RUN calls into the three window sections and writes
// them out behind a window header.  Instructions are packed greedily: an
// instruction that can be fused with the opcode just emitted rewrites that
// opcode in place.
//
// In interleaved mode all three logical sections share one buffer, so each
// instruction is immediately followed by its size, data and address bytes.

use std::io::Write;

use log::{debug, warn};

use super::address_cache::{AddressCache, DEFAULT_NEAR, DEFAULT_SAME, check_sizes};
use super::code_table::{CodeTable, VCD_ADD, VCD_COPY, VCD_RUN, inst_name};
use super::header::{WindowFlags, WindowHeader};
use super::instruction_map::InstructionMap;
use super::varint;
use crate::error::{Result, VcdiffError};

// ---------------------------------------------------------------------------
// Encoding table
// ---------------------------------------------------------------------------

/// A code table together with its reverse lookup and cache geometry.
#[derive(Clone, Debug)]
pub struct EncodingTable {
    table: CodeTable,
    map: InstructionMap,
    near: u8,
    same: u8,
}

impl EncodingTable {
    /// Wrap a custom table.  The table must be valid for the mode count
    /// implied by `near` and `same`.
    pub fn new(table: CodeTable, near: u8, same: u8) -> Result<Self> {
        check_sizes(near, same)?;
        let last_mode = AddressCache::new(near, same).last_mode();
        table.validate(last_mode)?;
        let map = InstructionMap::new(&table);
        Ok(Self {
            table,
            map,
            near,
            same,
        })
    }

    #[inline]
    pub fn table(&self) -> &CodeTable {
        &self.table
    }

    #[inline]
    pub fn near(&self) -> u8 {
        self.near
    }

    #[inline]
    pub fn same(&self) -> u8 {
        self.same
    }
}

impl Default for EncodingTable {
    fn default() -> Self {
        let table = CodeTable::rfc3284();
        let map = InstructionMap::new(&table);
        Self {
            table,
            map,
            near: DEFAULT_NEAR,
            same: DEFAULT_SAME,
        }
    }
}

// ---------------------------------------------------------------------------
// Window encoder
// ---------------------------------------------------------------------------

/// Accumulates the instructions of one window.
pub struct WindowEncoder<'t> {
    dictionary_size: u64,
    checksum: Option<u32>,
    interleaved: bool,
    codes: &'t EncodingTable,
    cache: AddressCache,

    /// ADD and RUN bytes (unused when interleaved).
    data: Vec<u8>,
    /// Opcodes and explicit sizes; everything when interleaved.
    instructions: Vec<u8>,
    /// COPY addresses (unused when interleaved).
    addresses: Vec<u8>,

    /// Target bytes described so far.
    target_length: u64,
    /// Index of the last single opcode that may still be fused.
    last_opcode_index: Option<usize>,
    last_inst: Option<u8>,
}

impl<'t> WindowEncoder<'t> {
    /// Start a window whose source segment is the whole dictionary.
    pub fn new(
        dictionary_size: u64,
        checksum: Option<u32>,
        interleaved: bool,
        codes: &'t EncodingTable,
    ) -> Self {
        Self {
            dictionary_size,
            checksum,
            interleaved,
            codes,
            cache: AddressCache::new(codes.near, codes.same),
            data: Vec::new(),
            instructions: Vec::new(),
            addresses: Vec::new(),
            target_length: 0,
            last_opcode_index: None,
            last_inst: None,
        }
    }

    /// Target bytes described so far.
    #[inline]
    pub fn target_length(&self) -> u64 {
        self.target_length
    }

    #[inline]
    fn here(&self) -> u64 {
        self.dictionary_size + self.target_length
    }

    fn data_section(&mut self) -> &mut Vec<u8> {
        if self.interleaved {
            &mut self.instructions
        } else {
            &mut self.data
        }
    }

    fn address_section(&mut self) -> &mut Vec<u8> {
        if self.interleaved {
            &mut self.instructions
        } else {
            &mut self.addresses
        }
    }

    /// Literal bytes.
    pub fn add(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        if self.last_inst == Some(VCD_ADD) {
            debug!("two consecutive ADD instructions at target offset {}", self.target_length);
        }
        self.encode_instruction(VCD_ADD, bytes.len(), 0)?;
        self.data_section().extend_from_slice(bytes);
        self.target_length += bytes.len() as u64;
        Ok(())
    }

    /// Copy `size` bytes from dictionary offset `offset`.
    pub fn copy(&mut self, offset: u64, size: usize) -> Result<()> {
        if size == 0 {
            return Ok(());
        }
        let here = self.here();
        let (mode, encoded) = self.cache.encode(offset, here)?;
        self.encode_instruction(VCD_COPY, size, mode)?;
        encoded.append_to(self.address_section());
        self.target_length += size as u64;
        Ok(())
    }

    /// `size` repetitions of `byte`.
    pub fn run(&mut self, size: usize, byte: u8) -> Result<()> {
        if size == 0 {
            return Ok(());
        }
        self.encode_instruction(VCD_RUN, size, 0)?;
        self.data_section().push(byte);
        self.target_length += size as u64;
        Ok(())
    }

    /// Emit the opcode (and explicit size if needed) for one instruction.
    fn encode_instruction(&mut self, inst: u8, size: usize, mode: u8) -> Result<()> {
        self.last_inst = Some(inst);
        let codes: &'t EncodingTable = self.codes;
        let map = &codes.map;

        if let Some(index) = self.last_opcode_index {
            let last = self.instructions[index];
            if size <= u8::MAX as usize
                && let Some(fused) = map.lookup_second(last, inst, size, mode)
            {
                self.instructions[index] = fused;
                self.last_opcode_index = None;
                return Ok(());
            }
            if let Some(fused) = map.lookup_second(last, inst, 0, mode) {
                self.instructions[index] = fused;
                varint::append_usize(&mut self.instructions, size);
                self.last_opcode_index = None;
                return Ok(());
            }
        }

        if size <= u8::MAX as usize
            && let Some(op) = map.lookup_first(inst, size, mode)
        {
            self.last_opcode_index = Some(self.instructions.len());
            self.instructions.push(op);
            return Ok(());
        }

        let op = map.lookup_first(inst, 0, mode).ok_or_else(|| {
            VcdiffError::invalid(format!(
                "code table has no explicit-size opcode for {} mode {mode}",
                inst_name(inst)
            ))
        })?;
        self.last_opcode_index = Some(self.instructions.len());
        self.instructions.push(op);
        varint::append_usize(&mut self.instructions, size);
        Ok(())
    }

    fn header(&self) -> WindowHeader {
        let mut win_ind = WindowFlags::SOURCE;
        if self.checksum.is_some() {
            win_ind |= WindowFlags::CHECKSUM;
        }
        let mut header = WindowHeader {
            win_ind,
            source_length: self.dictionary_size,
            source_position: 0,
            delta_length: 0,
            target_length: self.target_length,
            del_ind: 0,
            data_length: self.data.len() as u64,
            inst_length: self.instructions.len() as u64,
            addr_length: self.addresses.len() as u64,
            checksum: self.checksum,
        };
        header.delta_length = header.compute_delta_length();
        header
    }

    /// Write the window and reset for the next one.  Returns bytes written.
    pub fn output<W: Write + ?Sized>(&mut self, out: &mut W) -> Result<usize> {
        if self.target_length == 0 {
            warn!("emitting a window with an empty target");
        }
        let header = self.header();
        if header.delta_length > i32::MAX as u64 {
            return Err(VcdiffError::unsupported(format!(
                "window delta of {} bytes exceeds the format limit",
                header.delta_length
            )));
        }

        let mut window = Vec::with_capacity(
            32 + self.data.len() + self.instructions.len() + self.addresses.len(),
        );
        header.write(&mut window)?;
        window.extend_from_slice(&self.data);
        window.extend_from_slice(&self.instructions);
        window.extend_from_slice(&self.addresses);

        let after_delta_field = window.len() - header_prefix_len(&header);
        if after_delta_field as u64 != header.delta_length {
            warn!(
                "window delta length {} does not match {} bytes written",
                header.delta_length, after_delta_field
            );
        }

        out.write_all(&window)?;
        self.reset();
        Ok(window.len())
    }

    fn reset(&mut self) {
        self.cache.reset();
        self.data.clear();
        self.instructions.clear();
        self.addresses.clear();
        self.target_length = 0;
        self.last_opcode_index = None;
        self.last_inst = None;
    }
}

/// Bytes of the window header up to and including the delta-length field.
fn header_prefix_len(header: &WindowHeader) -> usize {
    1 + varint::calc_length(header.source_length)
        + varint::calc_length(header.source_position)
        + varint::calc_length(header.delta_length)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
