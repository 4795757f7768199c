// Reverse index of a code table: (instruction, size, mode) -> opcode.
//
// `first` covers opcodes that carry a single instruction.  `second` covers
// two-instruction opcodes, keyed by the single opcode that would otherwise
// encode the first half, so the encoder can rewrite the opcode it has just
// emitted into a fused one when the next instruction fits.

use super::code_table::{CodeTable, VCD_COPY, VCD_NOOP};

/// Reverse opcode lookup for one code table.
#[derive(Clone, Debug)]
pub struct InstructionMap {
    inst_modes: usize,
    max_size1: usize,
    max_size2: usize,
    /// `[inst_mode][size]`
    first: Vec<Option<u8>>,
    /// `[first_opcode][inst_mode][size]`
    second: Vec<Option<u8>>,
}

impl InstructionMap {
    pub fn new(table: &CodeTable) -> Self {
        let inst_modes = VCD_COPY as usize + table.max_mode() as usize + 1;
        let single_sizes = (0..256).filter_map(|op| match (table.inst1[op], table.inst2[op]) {
            (VCD_NOOP, VCD_NOOP) => None,
            (_, VCD_NOOP) => Some(table.size1[op]),
            (VCD_NOOP, _) => Some(table.size2[op]),
            _ => Some(table.size1[op]),
        });
        let max_size1 = single_sizes.max().unwrap_or(0) as usize;
        let max_size2 = (0..256)
            .filter(|&op| table.inst1[op] != VCD_NOOP && table.inst2[op] != VCD_NOOP)
            .map(|op| table.size2[op])
            .max()
            .unwrap_or(0) as usize;

        let mut map = Self {
            inst_modes,
            max_size1,
            max_size2,
            first: vec![None; inst_modes * (max_size1 + 1)],
            second: vec![None; 256 * inst_modes * (max_size2 + 1)],
        };

        for op in 0..=255u8 {
            let e = table.entry(op);
            match (e.inst1, e.inst2) {
                (VCD_NOOP, VCD_NOOP) => {}
                (inst, VCD_NOOP) => map.add_first(inst, e.size1, e.mode1, op),
                (VCD_NOOP, inst) => map.add_first(inst, e.size2, e.mode2, op),
                _ => {}
            }
        }
        for op in 0..=255u8 {
            let e = table.entry(op);
            if e.is_double()
                && let Some(single) = map.lookup_first(e.inst1, e.size1 as usize, e.mode1)
            {
                map.add_second(single, e.inst2, e.size2, e.mode2, op);
            }
        }
        map
    }

    #[inline]
    fn inst_mode(&self, inst: u8, mode: u8) -> Option<usize> {
        let im = if inst == VCD_COPY {
            inst as usize + mode as usize
        } else {
            inst as usize
        };
        (im < self.inst_modes).then_some(im)
    }

    fn add_first(&mut self, inst: u8, size: u8, mode: u8, opcode: u8) {
        if let Some(im) = self.inst_mode(inst, mode) {
            let slot = &mut self.first[im * (self.max_size1 + 1) + size as usize];
            if slot.is_none() {
                *slot = Some(opcode);
            }
        }
    }

    fn add_second(&mut self, first: u8, inst: u8, size: u8, mode: u8, opcode: u8) {
        if let Some(im) = self.inst_mode(inst, mode) {
            let idx = (first as usize * self.inst_modes + im) * (self.max_size2 + 1) + size as usize;
            let slot = &mut self.second[idx];
            if slot.is_none() {
                *slot = Some(opcode);
            }
        }
    }

    /// Single opcode for `inst` with exactly `size` (0 = size follows).
    pub fn lookup_first(&self, inst: u8, size: usize, mode: u8) -> Option<u8> {
        if size > self.max_size1 {
            return None;
        }
        let im = self.inst_mode(inst, mode)?;
        self.first[im * (self.max_size1 + 1) + size]
    }

    /// Fused opcode encoding `first` followed by `inst`/`size`/`mode`.
    pub fn lookup_second(&self, first: u8, inst: u8, size: usize, mode: u8) -> Option<u8> {
        if size > self.max_size2 {
            return None;
        }
        let im = self.inst_mode(inst, mode)?;
        self.second[(first as usize * self.inst_modes + im) * (self.max_size2 + 1) + size]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcdiff::code_table::{VCD_ADD, VCD_RUN};

    fn default_map() -> InstructionMap {
        InstructionMap::new(&CodeTable::rfc3284())
    }

    #[test]
    fn single_lookups() {
        let m = default_map();
        assert_eq!(m.lookup_first(VCD_RUN, 0, 0), Some(0));
        assert_eq!(m.lookup_first(VCD_RUN, 5, 0), None);
        assert_eq!(m.lookup_first(VCD_ADD, 0, 0), Some(1));
        assert_eq!(m.lookup_first(VCD_ADD, 17, 0), Some(18));
        assert_eq!(m.lookup_first(VCD_ADD, 18, 0), None);
        assert_eq!(m.lookup_first(VCD_COPY, 0, 0), Some(19));
        assert_eq!(m.lookup_first(VCD_COPY, 4, 0), Some(20));
        assert_eq!(m.lookup_first(VCD_COPY, 3, 0), None);
        assert_eq!(m.lookup_first(VCD_COPY, 0, 6), Some(115));
        assert_eq!(m.lookup_first(VCD_COPY, 18, 8), Some(162));
        assert_eq!(m.lookup_first(VCD_COPY, 4, 9), None);
    }

    #[test]
    fn fused_lookups() {
        let m = default_map();
        // ADD(1) is opcode 2; ADD(1)+COPY(4, mode 0) is 163.
        assert_eq!(m.lookup_second(2, VCD_COPY, 4, 0), Some(163));
        // ADD(2)+COPY(4, mode 0)
        assert_eq!(m.lookup_second(3, VCD_COPY, 4, 0), Some(166));
        // ADD(2)+COPY(4, mode 6)
        assert_eq!(m.lookup_second(3, VCD_COPY, 4, 6), Some(236));
        assert_eq!(m.lookup_second(2, VCD_COPY, 7, 0), None);
        // COPY(4, mode 0) is opcode 20; COPY(4)+ADD(1) is 247.
        assert_eq!(m.lookup_second(20, VCD_ADD, 1, 0), Some(247));
        // COPY(4, mode 8) is opcode 148.
        assert_eq!(m.lookup_first(VCD_COPY, 4, 8), Some(148));
        assert_eq!(m.lookup_second(148, VCD_ADD, 1, 0), Some(255));
        assert_eq!(m.lookup_second(20, VCD_ADD, 2, 0), None);
        // Size-0 single opcodes never start a fused pair in the default table.
        assert_eq!(m.lookup_second(1, VCD_COPY, 4, 0), None);
    }

    #[test]
    fn custom_table_with_noop_first_half() {
        let mut t = CodeTable::rfc3284();
        // Turn opcode 200 into NOOP + RUN(7).
        t.inst1[200] = VCD_NOOP;
        t.size1[200] = 0;
        t.mode1[200] = 0;
        t.inst2[200] = VCD_RUN;
        t.size2[200] = 7;
        t.mode2[200] = 0;
        let m = InstructionMap::new(&t);
        assert_eq!(m.lookup_first(VCD_RUN, 7, 0), Some(200));
    }
}
