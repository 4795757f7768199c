// VCDIFF address cache (RFC 3284, Section 5.3).
//
// COPY addresses are encoded relative to one of several reference points:
// the start of the address space (SELF), the current position (HERE), one
// of the `near` most recent addresses, or an exact hit in the `same` hash
// table.  Encoder and decoder run identical caches and both reset them at
// the start of every window.

use crate::buffer::ByteBuffer;
use crate::error::{Result, VcdiffError};

use super::varint;

// ---------------------------------------------------------------------------
// Address modes
// ---------------------------------------------------------------------------

/// Absolute address.
pub const VCD_SELF: u8 = 0;
/// Address relative to "here" (current position in address space).
pub const VCD_HERE: u8 = 1;
/// First NEAR mode.
pub const VCD_FIRST_NEAR: u8 = 2;

/// RFC 3284 default sizes.
pub const DEFAULT_NEAR: u8 = 4;
pub const DEFAULT_SAME: u8 = 3;

/// Mode numbers are single bytes.
pub const MAX_MODES: usize = 256;

/// Reject cache sizes that are zero or whose modes do not fit in a byte.
pub fn check_sizes(near: u8, same: u8) -> Result<()> {
    if near == 0 || same == 0 {
        return Err(VcdiffError::invalid(format!(
            "cache sizes must be non-zero (near {near}, same {same})"
        )));
    }
    let modes = VCD_FIRST_NEAR as usize + near as usize + same as usize;
    if modes > MAX_MODES {
        return Err(VcdiffError::invalid(format!(
            "cache sizes near {near} + same {same} give {modes} modes, at most {MAX_MODES} allowed"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Address cache
// ---------------------------------------------------------------------------

/// NEAR/SAME address cache.
///
/// With the default sizes there are 9 modes:
///   0      SELF  absolute
///   1      HERE  here - value
///   2..5   NEAR  near\[mode-2\] + value
///   6..8   SAME  same\[(mode-6)*256 + byte\]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressCache {
    near: Vec<u64>,
    same: Vec<u64>,
    next_slot: usize,
}

impl AddressCache {
    /// Cache with `near_size` NEAR slots and `same_size` SAME groups.
    pub fn new(near_size: u8, same_size: u8) -> Self {
        Self {
            near: vec![0; near_size as usize],
            same: vec![0; same_size as usize * 256],
            next_slot: 0,
        }
    }

    /// Zero all slots.  Called at every window boundary.
    pub fn reset(&mut self) {
        self.near.fill(0);
        self.same.fill(0);
        self.next_slot = 0;
    }

    #[inline]
    pub fn near_size(&self) -> u8 {
        self.near.len() as u8
    }

    #[inline]
    pub fn same_size(&self) -> u8 {
        (self.same.len() / 256) as u8
    }

    #[inline]
    pub fn first_same_mode(&self) -> u8 {
        VCD_FIRST_NEAR.saturating_add(self.near_size())
    }

    /// Highest valid mode number.
    #[inline]
    pub fn last_mode(&self) -> u8 {
        self.first_same_mode().saturating_add(self.same_size()).saturating_sub(1)
    }

    #[inline]
    pub fn is_same_mode(&self, mode: u8) -> bool {
        mode >= self.first_same_mode() && mode <= self.last_mode()
    }

    /// Record `addr` in both caches.
    #[inline]
    pub fn update(&mut self, addr: u64) {
        if !self.near.is_empty() {
            self.near[self.next_slot] = addr;
            self.next_slot = (self.next_slot + 1) % self.near.len();
        }
        if !self.same.is_empty() {
            let idx = (addr % self.same.len() as u64) as usize;
            self.same[idx] = addr;
        }
    }

    // -----------------------------------------------------------------------
    // Encoding
    // -----------------------------------------------------------------------

    /// Choose the cheapest mode for `addr` at position `here`.
    ///
    /// A SAME hit always wins since it costs one byte.  Otherwise SELF, HERE
    /// and each NEAR slot are tried in that order and a later mode replaces
    /// the current choice only when its value is strictly smaller.
    pub fn encode(&mut self, addr: u64, here: u64) -> Result<(u8, EncodedAddr)> {
        if addr >= here {
            return Err(VcdiffError::invalid(format!(
                "COPY address {addr} is not below here ({here})"
            )));
        }

        if !self.same.is_empty() {
            let slot = (addr % self.same.len() as u64) as usize;
            if self.same[slot] == addr {
                let mode = self.first_same_mode().saturating_add((slot / 256) as u8);
                self.update(addr);
                return Ok((mode, EncodedAddr::SameByte((slot % 256) as u8)));
            }
        }

        let mut best_mode = VCD_SELF;
        let mut best_value = addr;

        let from_here = here - addr;
        if from_here < best_value {
            best_mode = VCD_HERE;
            best_value = from_here;
        }

        for (i, &near) in self.near.iter().enumerate() {
            if let Some(d) = addr.checked_sub(near)
                && d < best_value
            {
                best_mode = VCD_FIRST_NEAR.saturating_add(i as u8);
                best_value = d;
            }
        }

        self.update(addr);
        Ok((best_mode, EncodedAddr::VarInt(best_value)))
    }

    // -----------------------------------------------------------------------
    // Decoding
    // -----------------------------------------------------------------------

    /// Read the address for `mode` from `buf`.
    ///
    /// A truncated address restores the buffer offset and returns EOD, so
    /// the caller can retry once more input is available.
    pub fn decode<B: ByteBuffer + ?Sized>(&mut self, here: u64, mode: u8, buf: &mut B) -> Result<u64> {
        if mode > self.last_mode() {
            return Err(VcdiffError::invalid(format!(
                "address mode {mode} exceeds last mode {}",
                self.last_mode()
            )));
        }

        let start = buf.position();
        let addr = if self.is_same_mode(mode) {
            let byte = buf.read_byte()?;
            let slot = (mode - self.first_same_mode()) as usize * 256 + byte as usize;
            self.same[slot]
        } else {
            let value = varint::parse_i64(buf)?;
            let addr = match mode {
                VCD_SELF => Some(value),
                VCD_HERE => here.checked_sub(value),
                _ => self.near[(mode - VCD_FIRST_NEAR) as usize].checked_add(value),
            };
            match addr {
                Some(a) => a,
                None => {
                    buf.set_position(start)?;
                    return Err(VcdiffError::invalid(format!(
                        "address underflow in mode {mode} at here {here}"
                    )));
                }
            }
        };

        if addr >= here {
            buf.set_position(start)?;
            return Err(VcdiffError::invalid(format!(
                "decoded address {addr} is not below here ({here})"
            )));
        }

        self.update(addr);
        Ok(addr)
    }
}

impl Default for AddressCache {
    fn default() -> Self {
        Self::new(DEFAULT_NEAR, DEFAULT_SAME)
    }
}

// ---------------------------------------------------------------------------
// Encoded address representation
// ---------------------------------------------------------------------------

/// An address as it appears in the address section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodedAddr {
    /// SELF, HERE and NEAR modes.
    VarInt(u64),
    /// SAME modes: one raw byte.
    SameByte(u8),
}

impl EncodedAddr {
    /// Append the encoded bytes to `out`.
    pub fn append_to(&self, out: &mut Vec<u8>) {
        match *self {
            EncodedAddr::VarInt(v) => varint::append_u64(out, v),
            EncodedAddr::SameByte(b) => out.push(b),
        }
    }

    pub fn len(&self) -> usize {
        match *self {
            EncodedAddr::VarInt(v) => varint::calc_length(v),
            EncodedAddr::SameByte(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
