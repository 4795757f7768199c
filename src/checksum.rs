// Adler-32 as defined by zlib (RFC 1950).
//
// Used for the optional per-window checksum of the SDCH extended format.
// With the `adler32` feature the hashing is delegated to `simd-adler32`;
// otherwise a portable scalar loop is used.

const BASE: u32 = 65521;
/// Largest n such that 255n(n+1)/2 + (n+1)(BASE-1) fits in 32 bits.
#[cfg_attr(feature = "adler32", allow(dead_code))]
const NMAX: usize = 5552;

/// Adler-32 of `data`.  The checksum of an empty slice is 1.
pub fn adler32(data: &[u8]) -> u32 {
    let mut h = Adler32::new();
    h.update(data);
    h.finish()
}

/// Incremental Adler-32.
#[derive(Clone)]
pub struct Adler32 {
    #[cfg(feature = "adler32")]
    inner: simd_adler32::Adler32,
    #[cfg(not(feature = "adler32"))]
    a: u32,
    #[cfg(not(feature = "adler32"))]
    b: u32,
}

impl Adler32 {
    pub fn new() -> Self {
        #[cfg(feature = "adler32")]
        {
            Self {
                inner: simd_adler32::Adler32::new(),
            }
        }
        #[cfg(not(feature = "adler32"))]
        {
            Self { a: 1, b: 0 }
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        #[cfg(feature = "adler32")]
        {
            self.inner.write(data);
        }
        #[cfg(not(feature = "adler32"))]
        {
            for block in data.chunks(NMAX) {
                for &byte in block {
                    self.a += u32::from(byte);
                    self.b += self.a;
                }
                self.a %= BASE;
                self.b %= BASE;
            }
        }
    }

    pub fn finish(&self) -> u32 {
        #[cfg(feature = "adler32")]
        {
            self.inner.finish()
        }
        #[cfg(not(feature = "adler32"))]
        {
            (self.b << 16) | self.a
        }
    }
}

impl Default for Adler32 {
    fn default() -> Self {
        Self::new()
    }
}

/// Checksum of `A ++ B` given `adler32(A)`, `adler32(B)` and `B.len()`.
///
/// Same arithmetic as zlib's `adler32_combine`.
pub fn adler32_combine(adler1: u32, adler2: u32, len2: u64) -> u32 {
    let base = u64::from(BASE);
    let rem = len2 % base;
    let mut sum1 = u64::from(adler1 & 0xFFFF);
    let mut sum2 = (rem * sum1) % base;
    sum1 += u64::from(adler2 & 0xFFFF) + base - 1;
    sum2 += u64::from(adler1 >> 16) + u64::from(adler2 >> 16) + base - rem;
    if sum1 >= base {
        sum1 -= base;
    }
    if sum1 >= base {
        sum1 -= base;
    }
    if sum2 >= base << 1 {
        sum2 -= base << 1;
    }
    if sum2 >= base {
        sum2 -= base;
    }
    ((sum2 << 16) | sum1) as u32
}
