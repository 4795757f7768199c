// VCDIFF variable-length integers (RFC 3284, Section 2).
//
// Base-128, big-endian: most-significant group first.  Every byte except
// the last has bit 7 set.  Decoded values are bounded by the signed maximum
// of the target width, so a 32-bit field never exceeds `i32::MAX`.

use std::io::{self, Write};

use crate::buffer::ByteBuffer;
use crate::error::{Result, VcdiffError};

/// Maximum encoded length of a 64-bit value (ceil(64/7) = 10).
pub const MAX_VARINT_LEN: usize = 10;

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode `num` into the tail of `buf`, returning the encoded length.
/// The encoded bytes are `buf[MAX_VARINT_LEN - len..]`.
#[inline]
pub fn encode_u64(mut num: u64, buf: &mut [u8; MAX_VARINT_LEN]) -> usize {
    let mut i = MAX_VARINT_LEN;
    loop {
        i -= 1;
        buf[i] = (num as u8 & 0x7F) | 0x80;
        num >>= 7;
        if num == 0 {
            break;
        }
    }
    buf[MAX_VARINT_LEN - 1] &= 0x7F;
    MAX_VARINT_LEN - i
}

/// Append the encoding of `num` to `out`.
#[inline]
pub fn append_u64(out: &mut Vec<u8>, num: u64) {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let len = encode_u64(num, &mut buf);
    out.extend_from_slice(&buf[MAX_VARINT_LEN - len..]);
}

#[inline]
pub fn append_u32(out: &mut Vec<u8>, num: u32) {
    append_u64(out, u64::from(num));
}

#[inline]
pub fn append_usize(out: &mut Vec<u8>, num: usize) {
    append_u64(out, num as u64);
}

/// Encode `num` and write it to a sink.
pub fn write_u64<W: Write + ?Sized>(w: &mut W, num: u64) -> io::Result<()> {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let len = encode_u64(num, &mut buf);
    w.write_all(&buf[MAX_VARINT_LEN - len..])
}

/// Number of bytes `num` occupies once encoded.
#[inline]
pub fn calc_length(num: u64) -> usize {
    let bits = 64 - num.leading_zeros();
    bits.max(1).div_ceil(7) as usize
}

// ---------------------------------------------------------------------------
// Decoding from a slice
// ---------------------------------------------------------------------------

// Shared accumulator.  `max` is the largest legal value; if the running
// value already exceeds `max >> 7` another group cannot fit.
#[inline]
fn accumulate<I: Iterator<Item = u8>>(bytes: I, max: u64) -> std::result::Result<(u64, usize), VarIntError> {
    let mut val: u64 = 0;
    for (i, byte) in bytes.enumerate() {
        if val > (max >> 7) {
            return Err(VarIntError::Overflow);
        }
        val = (val << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok((val, i + 1));
        }
    }
    Err(VarIntError::Eod)
}

/// Decode a value bounded by `i32::MAX`.  Returns `(value, consumed)`.
pub fn read_u32(data: &[u8]) -> std::result::Result<(u32, usize), VarIntError> {
    let (v, n) = accumulate(data.iter().copied(), i32::MAX as u64)?;
    Ok((v as u32, n))
}

/// Decode a value bounded by `i64::MAX`.  Returns `(value, consumed)`.
pub fn read_u64(data: &[u8]) -> std::result::Result<(u64, usize), VarIntError> {
    accumulate(data.iter().copied(), i64::MAX as u64)
}

// ---------------------------------------------------------------------------
// Decoding from a ByteBuffer
// ---------------------------------------------------------------------------

fn parse_bounded<B: ByteBuffer + ?Sized>(buf: &mut B, max: u64) -> Result<u64> {
    let start = buf.position();
    let mut val: u64 = 0;
    loop {
        let byte = match buf.read_byte() {
            Ok(b) => b,
            Err(e) => {
                buf.set_position(start)?;
                return Err(e);
            }
        };
        if val > (max >> 7) {
            buf.set_position(start)?;
            return Err(VarIntError::Overflow.into());
        }
        val = (val << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok(val);
        }
    }
}

/// Parse a 32-bit field.  On failure the buffer offset is left where it was.
pub fn parse_i32<B: ByteBuffer + ?Sized>(buf: &mut B) -> Result<u32> {
    parse_bounded(buf, i32::MAX as u64).map(|v| v as u32)
}

/// Parse a 64-bit field.  On failure the buffer offset is left where it was.
pub fn parse_i64<B: ByteBuffer + ?Sized>(buf: &mut B) -> Result<u64> {
    parse_bounded(buf, i64::MAX as u64)
}

/// Parse a length that must fit `usize`.
pub fn parse_len<B: ByteBuffer + ?Sized>(buf: &mut B) -> Result<usize> {
    let v = parse_i64(buf)?;
    usize::try_from(v).map_err(|_| VcdiffError::invalid(format!("length {v} exceeds address space")))
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VarIntError {
    /// Input ended before the terminating byte.
    #[error("varint truncated")]
    Eod,
    /// Value exceeds the signed maximum of the field width.
    #[error("varint overflow")]
    Overflow,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
