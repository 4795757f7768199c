// VCDIFF instruction code table (RFC 3284, Section 5.4 and 5.6).
//
// Each of the 256 opcodes describes up to two instructions.  The table is
// stored as six parallel arrays, which is also its serialized form when a
// custom table is shipped inside a delta file: inst1, inst2, size1, size2,
// mode1, mode2, 256 bytes each.

use crate::error::{Result, VcdiffError};

/// Instruction types.
pub const VCD_NOOP: u8 = 0;
pub const VCD_ADD: u8 = 1;
pub const VCD_RUN: u8 = 2;
pub const VCD_COPY: u8 = 3;

/// Serialized size of a code table.
pub const CODE_TABLE_BYTES: usize = 6 * 256;

/// Smallest COPY size with its own opcode in the default table.
const MIN_COPY: u8 = 4;

/// Both halves of one opcode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CodeTableEntry {
    pub inst1: u8,
    pub size1: u8,
    pub mode1: u8,
    pub inst2: u8,
    pub size2: u8,
    pub mode2: u8,
}

impl CodeTableEntry {
    #[inline]
    pub fn is_double(&self) -> bool {
        self.inst1 != VCD_NOOP && self.inst2 != VCD_NOOP
    }
}

/// A complete 256-opcode table.
#[derive(Clone, PartialEq, Eq)]
pub struct CodeTable {
    pub inst1: [u8; 256],
    pub inst2: [u8; 256],
    pub size1: [u8; 256],
    pub size2: [u8; 256],
    pub mode1: [u8; 256],
    pub mode2: [u8; 256],
}

impl CodeTable {
    fn empty() -> Self {
        Self {
            inst1: [VCD_NOOP; 256],
            inst2: [VCD_NOOP; 256],
            size1: [0; 256],
            size2: [0; 256],
            mode1: [0; 256],
            mode2: [0; 256],
        }
    }

    fn set(&mut self, opcode: usize, first: (u8, u8, u8), second: (u8, u8, u8)) {
        (self.inst1[opcode], self.size1[opcode], self.mode1[opcode]) = first;
        (self.inst2[opcode], self.size2[opcode], self.mode2[opcode]) = second;
    }

    /// The RFC 3284 default table (near = 4, same = 3).
    pub fn rfc3284() -> Self {
        const NOTHING: (u8, u8, u8) = (VCD_NOOP, 0, 0);
        const ADD_SIZES: u8 = 17;
        const COPY_SIZES: u8 = 15;
        const MODES: u8 = 9;
        const NEAR_LIMIT: u8 = 6;

        let mut t = Self::empty();
        let mut op = 0usize;

        t.set(op, (VCD_RUN, 0, 0), NOTHING);
        op += 1;

        for size in 0..=ADD_SIZES {
            t.set(op, (VCD_ADD, size, 0), NOTHING);
            op += 1;
        }

        for mode in 0..MODES {
            t.set(op, (VCD_COPY, 0, mode), NOTHING);
            op += 1;
            for size in MIN_COPY..MIN_COPY + COPY_SIZES {
                t.set(op, (VCD_COPY, size, mode), NOTHING);
                op += 1;
            }
        }

        for mode in 0..MODES {
            let copy_max = if mode < NEAR_LIMIT { 6 } else { 4 };
            for add in 1..=4 {
                for copy in MIN_COPY..=copy_max {
                    t.set(op, (VCD_ADD, add, 0), (VCD_COPY, copy, mode));
                    op += 1;
                }
            }
        }

        for mode in 0..MODES {
            t.set(op, (VCD_COPY, MIN_COPY, mode), (VCD_ADD, 1, 0));
            op += 1;
        }

        debug_assert_eq!(op, 256, "default code table must fill all 256 opcodes");
        t
    }

    /// Parse the serialized form.  Exactly `CODE_TABLE_BYTES` are required.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != CODE_TABLE_BYTES {
            return Err(VcdiffError::invalid(format!(
                "code table must be {CODE_TABLE_BYTES} bytes, got {}",
                bytes.len()
            )));
        }
        let mut t = Self::empty();
        let arrays = [
            &mut t.inst1,
            &mut t.inst2,
            &mut t.size1,
            &mut t.size2,
            &mut t.mode1,
            &mut t.mode2,
        ];
        for (dst, src) in arrays.into_iter().zip(bytes.chunks_exact(256)) {
            dst.copy_from_slice(src);
        }
        Ok(t)
    }

    /// Serialize as inst1 ++ inst2 ++ size1 ++ size2 ++ mode1 ++ mode2.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CODE_TABLE_BYTES);
        for arr in [
            &self.inst1,
            &self.inst2,
            &self.size1,
            &self.size2,
            &self.mode1,
            &self.mode2,
        ] {
            out.extend_from_slice(arr);
        }
        out
    }

    #[inline]
    pub fn entry(&self, opcode: u8) -> CodeTableEntry {
        let i = opcode as usize;
        CodeTableEntry {
            inst1: self.inst1[i],
            size1: self.size1[i],
            mode1: self.mode1[i],
            inst2: self.inst2[i],
            size2: self.size2[i],
            mode2: self.mode2[i],
        }
    }

    /// Largest COPY mode referenced by any opcode.
    pub fn max_mode(&self) -> u8 {
        let first = (0..256)
            .filter(|&i| self.inst1[i] == VCD_COPY)
            .map(|i| self.mode1[i]);
        let second = (0..256)
            .filter(|&i| self.inst2[i] == VCD_COPY)
            .map(|i| self.mode2[i]);
        first.chain(second).max().unwrap_or(0)
    }

    /// Check that every opcode is well formed for a cache whose highest
    /// mode is `last_mode`, and that ADD, RUN and every COPY mode have a
    /// size-0 single opcode so any instruction can be expressed.
    pub fn validate(&self, last_mode: u8) -> Result<()> {
        let mut has_add = false;
        let mut has_run = false;
        let mut copy_modes = vec![false; last_mode as usize + 1];

        for op in 0..256 {
            for (inst, size, mode) in [
                (self.inst1[op], self.size1[op], self.mode1[op]),
                (self.inst2[op], self.size2[op], self.mode2[op]),
            ] {
                match inst {
                    VCD_NOOP if size != 0 || mode != 0 => {
                        return Err(VcdiffError::invalid(format!(
                            "opcode {op}: NOOP with size {size} mode {mode}"
                        )));
                    }
                    VCD_ADD | VCD_RUN if mode != 0 => {
                        return Err(VcdiffError::invalid(format!(
                            "opcode {op}: mode {mode} on a non-COPY instruction"
                        )));
                    }
                    VCD_COPY if mode > last_mode => {
                        return Err(VcdiffError::invalid(format!(
                            "opcode {op}: COPY mode {mode} exceeds last mode {last_mode}"
                        )));
                    }
                    i if i > VCD_COPY => {
                        return Err(VcdiffError::invalid(format!(
                            "opcode {op}: unknown instruction type {i}"
                        )));
                    }
                    _ => {}
                }
            }
            if self.inst2[op] == VCD_NOOP && self.size1[op] == 0 {
                match self.inst1[op] {
                    VCD_ADD => has_add = true,
                    VCD_RUN => has_run = true,
                    VCD_COPY => copy_modes[self.mode1[op] as usize] = true,
                    _ => {}
                }
            }
        }

        if !has_add || !has_run {
            return Err(VcdiffError::invalid(
                "code table lacks a size-0 opcode for ADD or RUN",
            ));
        }
        if let Some(mode) = copy_modes.iter().position(|&present| !present) {
            return Err(VcdiffError::invalid(format!(
                "code table lacks a size-0 opcode for COPY mode {mode}"
            )));
        }
        Ok(())
    }
}

impl Default for CodeTable {
    fn default() -> Self {
        Self::rfc3284()
    }
}

impl std::fmt::Debug for CodeTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeTable")
            .field("max_mode", &self.max_mode())
            .finish_non_exhaustive()
    }
}

/// Human-readable instruction name.
pub fn inst_name(inst: u8) -> &'static str {
    match inst {
        VCD_NOOP => "NOOP",
        VCD_ADD => "ADD",
        VCD_RUN => "RUN",
        VCD_COPY => "COPY",
        _ => "?",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn e(t: &CodeTable, op: u8) -> CodeTableEntry {
        t.entry(op)
    }

    #[test]
    fn opcode_0_is_run() {
        let t = CodeTable::rfc3284();
        assert_eq!(
            e(&t, 0),
            CodeTableEntry {
                inst1: VCD_RUN,
                ..Default::default()
            }
        );
    }

    #[test]
    fn add_opcodes() {
        let t = CodeTable::rfc3284();
        for op in 1..=18u8 {
            let x = e(&t, op);
            assert_eq!(x.inst1, VCD_ADD);
            assert_eq!(x.size1, op - 1);
            assert_eq!(x.inst2, VCD_NOOP);
        }
    }

    #[test]
    fn copy_opcodes() {
        let t = CodeTable::rfc3284();
        assert_eq!((e(&t, 19).inst1, e(&t, 19).size1, e(&t, 19).mode1), (VCD_COPY, 0, 0));
        assert_eq!((e(&t, 20).size1, e(&t, 20).mode1), (4, 0));
        assert_eq!((e(&t, 34).size1, e(&t, 34).mode1), (18, 0));
        assert_eq!((e(&t, 35).size1, e(&t, 35).mode1), (0, 1));
        assert_eq!((e(&t, 115).size1, e(&t, 115).mode1), (0, 6));
        assert_eq!((e(&t, 162).size1, e(&t, 162).mode1), (18, 8));
    }

    #[test]
    fn double_opcodes() {
        let t = CodeTable::rfc3284();
        let x = e(&t, 163);
        assert_eq!((x.inst1, x.size1, x.inst2, x.size2, x.mode2), (VCD_ADD, 1, VCD_COPY, 4, 0));
        let x = e(&t, 166);
        assert_eq!((x.size1, x.size2), (2, 4));
        let x = e(&t, 234);
        assert_eq!((x.size1, x.size2, x.mode2), (4, 6, 5));
        let x = e(&t, 235);
        assert_eq!((x.size1, x.size2, x.mode2), (1, 4, 6));
        let x = e(&t, 246);
        assert_eq!((x.size1, x.size2, x.mode2), (4, 4, 8));
        let x = e(&t, 247);
        assert_eq!((x.inst1, x.size1, x.mode1, x.inst2, x.size2), (VCD_COPY, 4, 0, VCD_ADD, 1));
        let x = e(&t, 255);
        assert_eq!((x.inst1, x.mode1, x.inst2), (VCD_COPY, 8, VCD_ADD));
    }

    #[test]
    fn bytes_roundtrip() {
        let t = CodeTable::rfc3284();
        let b = t.to_bytes();
        assert_eq!(b.len(), CODE_TABLE_BYTES);
        // inst1 array first, then inst2
        assert_eq!(b[0], VCD_RUN);
        assert_eq!(b[256 + 163], VCD_COPY);
        assert_eq!(CodeTable::from_bytes(&b).unwrap(), t);
    }

    #[test]
    fn from_bytes_requires_exact_length() {
        assert!(CodeTable::from_bytes(&[0u8; 1535]).is_err());
        assert!(CodeTable::from_bytes(&[0u8; 1537]).is_err());
    }

    #[test]
    fn default_validates() {
        let t = CodeTable::rfc3284();
        assert_eq!(t.max_mode(), 8);
        t.validate(8).unwrap();
        assert!(t.validate(7).is_err());
    }

    #[test]
    fn validate_rejects_unknown_type() {
        let mut t = CodeTable::rfc3284();
        t.inst1[200] = 9;
        assert!(t.validate(8).is_err());
    }

    #[test]
    fn validate_requires_size0_opcodes() {
        let mut t = CodeTable::rfc3284();
        t.size1[1] = 3;
        assert!(t.validate(8).is_err());
    }
}
