// Rabin-Karp rolling hash over fixed-size blocks, plus the byte-run
// comparison helpers used to grow a hash hit into a full match.
//
// The hash is a polynomial in base 257 reduced modulo 2^23.  Because the
// modulus is a power of two the reduction is a mask, and removing the
// leading byte uses a precomputed 256-entry table so that sliding the
// window by one byte is O(1).

/// Polynomial base.
pub const MULT: u32 = 257;
/// Modulus (a power of two, so reduction is a mask).
pub const BASE: u32 = 1 << 23;
const BASE_MASK: u32 = BASE - 1;

#[inline(always)]
fn mod_base(x: u32) -> u32 {
    x & BASE_MASK
}

/// `(-x) mod BASE`, for operands already in `0..BASE`.
#[inline(always)]
fn neg_mod_base(x: u32) -> u32 {
    mod_base(BASE.wrapping_sub(x))
}

// ---------------------------------------------------------------------------
// Rolling hash
// ---------------------------------------------------------------------------

/// Rolling hash over windows of exactly `block_size` bytes.
#[derive(Clone)]
pub struct RollingHash {
    block_size: usize,
    /// `remove[b]` = `-(b * 257^(block_size-1)) mod BASE`.
    remove: [u32; 256],
}

impl RollingHash {
    /// Build the removal table for `block_size` (must be at least 2).
    pub fn new(block_size: usize) -> Self {
        debug_assert!(block_size >= 2, "rolling hash needs at least two bytes");
        let mut multiplier: u32 = 1;
        for _ in 1..block_size {
            multiplier = mod_base(multiplier.wrapping_mul(MULT));
        }
        let mut remove = [0u32; 256];
        let mut acc: u32 = 0;
        for slot in remove.iter_mut() {
            *slot = neg_mod_base(acc);
            acc = mod_base(acc.wrapping_add(multiplier));
        }
        Self { block_size, remove }
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Hash the first `block_size` bytes of `bytes`.
    #[inline]
    pub fn hash(&self, bytes: &[u8]) -> u32 {
        hash_block(&bytes[..self.block_size])
    }

    /// Slide the window one byte: drop `leaving`, append `entering`.
    #[inline]
    pub fn update(&self, old: u32, leaving: u8, entering: u8) -> u32 {
        let partial = mod_base(old.wrapping_add(self.remove[leaving as usize]));
        mod_base(partial.wrapping_mul(MULT).wrapping_add(u32::from(entering)))
    }
}

/// Hash a whole block from scratch.
#[inline]
pub fn hash_block(block: &[u8]) -> u32 {
    debug_assert!(block.len() >= 2);
    let mut h = u32::from(block[0]) * MULT + u32::from(block[1]);
    for &b in &block[2..] {
        h = mod_base(mod_base(h).wrapping_mul(MULT).wrapping_add(u32::from(b)));
    }
    mod_base(h)
}

// ---------------------------------------------------------------------------
// Match extension helpers
// ---------------------------------------------------------------------------

/// Length of the common prefix of `s1[..n]` and `s2[..n]`.
///
/// Compares a machine word at a time, then finishes byte by byte.
#[inline]
pub fn forward_match(s1: &[u8], s2: &[u8], n: usize) -> usize {
    let n = n.min(s1.len()).min(s2.len());
    let (a, b) = (&s1[..n], &s2[..n]);
    let mut i = 0;
    for (wa, wb) in a.chunks_exact(8).zip(b.chunks_exact(8)) {
        let xa = u64::from_le_bytes(word(wa));
        let xb = u64::from_le_bytes(word(wb));
        let xor = xa ^ xb;
        if xor != 0 {
            return i + (xor.trailing_zeros() / 8) as usize;
        }
        i += 8;
    }
    while i < n && a[i] == b[i] {
        i += 1;
    }
    i
}

/// Length of the common suffix of `s1[..n]` and `s2[..n]`.
#[inline]
pub fn backward_match(s1: &[u8], s2: &[u8], n: usize) -> usize {
    let n = n.min(s1.len()).min(s2.len());
    let (a, b) = (&s1[s1.len() - n..], &s2[s2.len() - n..]);
    let mut matched = 0;
    for (wa, wb) in a.rchunks_exact(8).zip(b.rchunks_exact(8)) {
        let xa = u64::from_le_bytes(word(wa));
        let xb = u64::from_le_bytes(word(wb));
        let xor = xa ^ xb;
        if xor != 0 {
            return matched + (xor.leading_zeros() / 8) as usize;
        }
        matched += 8;
    }
    while matched < n && a[n - 1 - matched] == b[n - 1 - matched] {
        matched += 1;
    }
    matched
}

#[inline(always)]
fn word(chunk: &[u8]) -> [u8; 8] {
    let mut w = [0u8; 8];
    w.copy_from_slice(chunk);
    w
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
