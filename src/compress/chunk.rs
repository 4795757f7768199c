// Per-chunk match search.
//
// One chunk of target becomes one window.  The chunk is scanned with the
// rolling hash; every position whose block hash hits the dictionary index
// is checked for a match, and matches of at least `min_match` bytes become
// COPY instructions with the bytes before them emitted as ADD.  The target
// is never searched against itself, so no RUN is produced.

use std::io::Write;

use log::{debug, trace};

use crate::checksum::adler32;
use crate::error::Result;
use crate::hash::{BlockHash, Match};
use crate::vcdiff::encoder::{EncodingTable, WindowEncoder};

/// Outcome of encoding one chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkStats {
    /// Window bytes written.
    pub bytes_written: usize,
    /// Bytes covered by COPY instructions.
    pub copied: usize,
    /// Bytes emitted as literals.
    pub added: usize,
    /// Adler-32 of the chunk, when checksums are on.
    pub checksum: Option<u32>,
}

/// Encodes target chunks against one prebuilt dictionary index.
pub struct ChunkEncoder<'a> {
    index: &'a BlockHash<'a>,
    codes: &'a EncodingTable,
    min_match: usize,
    interleaved: bool,
    checksum: bool,
}

impl<'a> ChunkEncoder<'a> {
    pub fn new(
        index: &'a BlockHash<'a>,
        codes: &'a EncodingTable,
        min_match: usize,
        interleaved: bool,
        checksum: bool,
    ) -> Self {
        Self {
            index,
            codes,
            min_match,
            interleaved,
            checksum,
        }
    }

    /// Encode `chunk` as one window and write it to `out`.
    pub fn encode_chunk<W: Write + ?Sized>(&self, chunk: &[u8], out: &mut W) -> Result<ChunkStats> {
        let checksum = self.checksum.then(|| adler32(chunk));
        let dictionary_size = self.index.source().len() as u64;
        let mut window = WindowEncoder::new(dictionary_size, checksum, self.interleaved, self.codes);
        let mut stats = ChunkStats {
            checksum,
            ..ChunkStats::default()
        };

        let bs = self.index.block_size();
        let hasher = self.index.hasher();
        let mut next = 0;

        if chunk.len() >= bs {
            let last_block_start = chunk.len() - bs;
            let mut candidate = 0;
            let mut hash = hasher.hash(chunk);

            while chunk.len() - next >= bs {
                let mut best = Match::default();
                self.index.find_best_match(hash, candidate, next, chunk, &mut best);

                if best.size >= self.min_match {
                    trace!(
                        "match of {} bytes: target {} <- dictionary {}",
                        best.size,
                        next + best.target_offset,
                        best.source_offset
                    );
                    if best.target_offset > 0 {
                        window.add(&chunk[next..next + best.target_offset])?;
                        stats.added += best.target_offset;
                    }
                    window.copy(best.source_offset as u64, best.size)?;
                    stats.copied += best.size;
                    next += best.target_offset + best.size;
                    candidate = next;
                    if candidate > last_block_start {
                        break;
                    }
                    hash = hasher.hash(&chunk[candidate..]);
                } else {
                    if candidate + 1 > last_block_start {
                        break;
                    }
                    hash = hasher.update(hash, chunk[candidate], chunk[candidate + bs]);
                    candidate += 1;
                }
            }
        }

        if next < chunk.len() {
            window.add(&chunk[next..])?;
            stats.added += chunk.len() - next;
        }

        stats.bytes_written = window.output(out)?;
        debug!(
            "window: {} target bytes, {} copied, {} added, {} delta bytes",
            chunk.len(),
            stats.copied,
            stats.added,
            stats.bytes_written
        );
        Ok(stats)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
