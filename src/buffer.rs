// Positioned byte sources for the encoder and decoder.
//
// The codec never reads its inputs through plain `io::Read`: the decoder
// must be able to rewind after a partially available instruction, and the
// dictionary must be addressable at random.  `ByteBuffer` captures exactly
// the operations the codec needs, and running past the end is always an
// explicit `VcdiffError::Eod`, never a panic.

use std::io::{self, Read, Seek, SeekFrom};

use crate::error::{Result, VcdiffError};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A seekable, length-aware byte source.
pub trait ByteBuffer {
    /// Current read offset.
    fn position(&self) -> usize;

    /// Move the read offset.  Positions past `len()` fail with EOD.
    fn set_position(&mut self, pos: usize) -> Result<()>;

    /// Total length of the underlying data.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes between the read offset and the end.
    fn remaining(&self) -> usize {
        self.len().saturating_sub(self.position())
    }

    /// `true` if at least one more byte can be read.
    fn can_read(&self) -> bool {
        self.remaining() > 0
    }

    /// Return the next byte without consuming it.
    fn peek_byte(&mut self) -> Result<u8>;

    /// Consume and return the next byte.
    fn read_byte(&mut self) -> Result<u8> {
        let b = self.peek_byte()?;
        self.advance()?;
        Ok(b)
    }

    /// Step over one byte.
    fn advance(&mut self) -> Result<()> {
        self.skip(1)
    }

    /// Copy exactly `dst.len()` bytes into `dst` without consuming them.
    /// On EOD the offset is unchanged.
    fn peek_into(&mut self, dst: &mut [u8]) -> Result<()>;

    /// Return exactly `n` bytes without consuming them.
    fn peek_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        if n > self.remaining() {
            return Err(VcdiffError::Eod);
        }
        let mut out = vec![0u8; n];
        self.peek_into(&mut out)?;
        Ok(out)
    }

    /// Consume exactly `n` bytes.  On EOD the offset is unchanged.
    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let out = self.peek_bytes(n)?;
        self.skip(n)?;
        Ok(out)
    }

    /// Consume up to `max` bytes that are available right now.
    ///
    /// Unlike `read_bytes` a short (or empty) result is not an error; the
    /// interleaved decoder uses it to make progress on partial input.
    fn read_available(&mut self, max: usize) -> Result<Vec<u8>> {
        let n = max.min(self.remaining());
        self.read_bytes(n)
    }

    /// Step over `n` bytes.
    fn skip(&mut self, n: usize) -> Result<()> {
        let target = self.position().checked_add(n).ok_or(VcdiffError::Eod)?;
        self.set_position(target)
    }

    /// Load the whole source into memory so `as_slice` succeeds.
    fn buffer_all(&mut self) -> Result<()>;

    /// The full contents, if they are resident in memory.
    fn as_slice(&self) -> Option<&[u8]>;
}

impl<B: ByteBuffer + ?Sized> ByteBuffer for &mut B {
    fn position(&self) -> usize {
        (**self).position()
    }
    fn set_position(&mut self, pos: usize) -> Result<()> {
        (**self).set_position(pos)
    }
    fn len(&self) -> usize {
        (**self).len()
    }
    fn peek_byte(&mut self) -> Result<u8> {
        (**self).peek_byte()
    }
    fn read_byte(&mut self) -> Result<u8> {
        (**self).read_byte()
    }
    fn peek_into(&mut self, dst: &mut [u8]) -> Result<()> {
        (**self).peek_into(dst)
    }
    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        (**self).read_bytes(n)
    }
    fn read_available(&mut self, max: usize) -> Result<Vec<u8>> {
        (**self).read_available(max)
    }
    fn skip(&mut self, n: usize) -> Result<()> {
        (**self).skip(n)
    }
    fn buffer_all(&mut self) -> Result<()> {
        (**self).buffer_all()
    }
    fn as_slice(&self) -> Option<&[u8]> {
        (**self).as_slice()
    }
}

// ---------------------------------------------------------------------------
// In-memory slice
// ---------------------------------------------------------------------------

/// Random-access view over a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct SliceBuffer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceBuffer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// The unread tail of the slice.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}

impl<'a> From<&'a [u8]> for SliceBuffer<'a> {
    fn from(data: &'a [u8]) -> Self {
        Self::new(data)
    }
}

impl<'a> From<&'a Vec<u8>> for SliceBuffer<'a> {
    fn from(data: &'a Vec<u8>) -> Self {
        Self::new(data.as_slice())
    }
}

impl ByteBuffer for SliceBuffer<'_> {
    #[inline]
    fn position(&self) -> usize {
        self.pos
    }

    fn set_position(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(VcdiffError::Eod);
        }
        self.pos = pos;
        Ok(())
    }

    #[inline]
    fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    fn peek_byte(&mut self) -> Result<u8> {
        self.data.get(self.pos).copied().ok_or(VcdiffError::Eod)
    }

    #[inline]
    fn read_byte(&mut self) -> Result<u8> {
        let b = self.peek_byte()?;
        self.pos += 1;
        Ok(b)
    }

    fn peek_into(&mut self, dst: &mut [u8]) -> Result<()> {
        let end = self.pos.checked_add(dst.len()).ok_or(VcdiffError::Eod)?;
        let src = self.data.get(self.pos..end).ok_or(VcdiffError::Eod)?;
        dst.copy_from_slice(src);
        Ok(())
    }

    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let end = self.pos.checked_add(n).ok_or(VcdiffError::Eod)?;
        let src = self.data.get(self.pos..end).ok_or(VcdiffError::Eod)?;
        self.pos = end;
        Ok(src.to_vec())
    }

    fn buffer_all(&mut self) -> Result<()> {
        Ok(())
    }

    fn as_slice(&self) -> Option<&[u8]> {
        Some(self.data)
    }
}

// ---------------------------------------------------------------------------
// Seekable stream
// ---------------------------------------------------------------------------

/// View over a seekable reader such as a `File`.
///
/// Reads go straight to the underlying stream until `buffer_all` is called,
/// after which every access is served from memory.  Sequential reads do not
/// seek, so wrapping a `BufReader` keeps its buffer warm.
pub struct StreamBuffer<R> {
    inner: R,
    start: u64,
    pos: usize,
    len: usize,
    /// Physical offset of `inner`, if known.
    cursor: Option<u64>,
    resident: Option<Vec<u8>>,
}

impl<R: Read + Seek> StreamBuffer<R> {
    /// Wrap `inner`, measuring its length from the current offset to the end.
    pub fn new(mut inner: R) -> Result<Self> {
        let start = inner.stream_position()?;
        let end = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(start))?;
        let len = usize::try_from(end.saturating_sub(start))
            .map_err(|_| VcdiffError::unsupported("stream too large for this platform"))?;
        Ok(Self {
            inner,
            start,
            pos: 0,
            len,
            cursor: Some(start),
            resident: None,
        })
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn fill(&mut self, dst: &mut [u8]) -> Result<()> {
        let want = self.start + self.pos as u64;
        if self.cursor != Some(want) {
            self.cursor = None;
            self.inner.seek(SeekFrom::Start(want))?;
        }
        match self.inner.read_exact(dst) {
            Ok(()) => {
                self.cursor = Some(want + dst.len() as u64);
                Ok(())
            }
            Err(e) => {
                self.cursor = None;
                if e.kind() == io::ErrorKind::UnexpectedEof {
                    Err(VcdiffError::Eod)
                } else {
                    Err(e.into())
                }
            }
        }
    }
}

impl<R: Read + Seek> ByteBuffer for StreamBuffer<R> {
    fn position(&self) -> usize {
        self.pos
    }

    fn set_position(&mut self, pos: usize) -> Result<()> {
        if pos > self.len {
            return Err(VcdiffError::Eod);
        }
        self.pos = pos;
        Ok(())
    }

    fn len(&self) -> usize {
        self.len
    }

    fn peek_byte(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        self.peek_into(&mut b)?;
        Ok(b[0])
    }

    fn peek_into(&mut self, dst: &mut [u8]) -> Result<()> {
        if dst.len() > self.remaining() {
            return Err(VcdiffError::Eod);
        }
        if let Some(data) = &self.resident {
            dst.copy_from_slice(&data[self.pos..self.pos + dst.len()]);
            return Ok(());
        }
        self.fill(dst)
    }

    // Lengths come from untrusted headers, so check them before allocating.
    fn peek_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        if n > self.remaining() {
            return Err(VcdiffError::Eod);
        }
        if let Some(data) = &self.resident {
            return Ok(data[self.pos..self.pos + n].to_vec());
        }
        let mut out = vec![0u8; n];
        self.fill(&mut out)?;
        Ok(out)
    }

    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let out = self.peek_bytes(n)?;
        self.pos += n;
        Ok(out)
    }

    fn buffer_all(&mut self) -> Result<()> {
        if self.resident.is_some() {
            return Ok(());
        }
        let saved = self.pos;
        self.pos = 0;
        let mut data = vec![0u8; self.len];
        self.fill(&mut data)?;
        self.pos = saved;
        self.resident = Some(data);
        Ok(())
    }

    fn as_slice(&self) -> Option<&[u8]> {
        self.resident.as_deref()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
