// Content-addressed index of dictionary blocks.
//
// The dictionary is cut into non-overlapping `block_size` blocks.  Each
// block is hashed with the rolling hash and appended to the collision
// chain of its bucket, so chains hold blocks in dictionary order.  Chains
// live in an arena indexed by block number: `next[b]` links to the next
// block in the same bucket and `last[head]` points at the tail of the
// chain that starts at `head`.
//
// The index is built once and is read-only while matching.

use log::debug;

use super::rolling::{RollingHash, backward_match, forward_match};
use crate::error::{Result, VcdiffError};

/// Default block size in bytes.
pub const DEFAULT_BLOCK_SIZE: usize = 16;

/// Candidate blocks rejected by content before a chain walk gives up.
const MAX_PROBES: usize = 16;

// ---------------------------------------------------------------------------
// Match result
// ---------------------------------------------------------------------------

/// Best match found so far for one target position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Match {
    /// Match length in bytes (0 = none).
    pub size: usize,
    /// Absolute offset of the match in the dictionary.
    pub source_offset: usize,
    /// Offset of the match relative to the start of the unencoded target.
    pub target_offset: usize,
}

impl Match {
    /// Replace the stored match only if `size` is strictly larger.
    #[inline]
    pub fn replace_if_better(&mut self, size: usize, source_offset: usize, target_offset: usize) -> bool {
        if size > self.size {
            *self = Match {
                size,
                source_offset,
                target_offset,
            };
            true
        } else {
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Block hash
// ---------------------------------------------------------------------------

/// Hash index over a dictionary.
pub struct BlockHash<'a> {
    source: &'a [u8],
    hasher: RollingHash,
    /// Bucket heads: first block number in each chain.
    table: Vec<Option<usize>>,
    next: Vec<Option<usize>>,
    last: Vec<Option<usize>>,
    mask: usize,
    max_matches: usize,
}

impl<'a> BlockHash<'a> {
    /// Allocate an empty index for `source`.  Call `add_all_blocks` to fill it.
    pub fn new(source: &'a [u8], block_size: usize) -> Result<Self> {
        if block_size < 2 {
            return Err(VcdiffError::InvalidOptions(format!(
                "block size must be at least 2, got {block_size}"
            )));
        }
        let table_size = table_size_for(source.len())?;
        let blocks = source.len() / block_size;
        Ok(Self {
            source,
            hasher: RollingHash::new(block_size),
            table: vec![None; table_size],
            next: vec![None; blocks],
            last: vec![None; blocks],
            mask: table_size - 1,
            max_matches: max_matches_for(block_size),
        })
    }

    /// Build and fill an index in one step.
    pub fn build(source: &'a [u8], block_size: usize) -> Result<Self> {
        let mut bh = Self::new(source, block_size)?;
        bh.add_all_blocks();
        Ok(bh)
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.hasher.block_size()
    }

    #[inline]
    pub fn hasher(&self) -> &RollingHash {
        &self.hasher
    }

    #[inline]
    pub fn source(&self) -> &'a [u8] {
        self.source
    }

    /// Number of buckets (always a power of two).
    #[inline]
    pub fn table_size(&self) -> usize {
        self.table.len()
    }

    /// Verified candidates examined per lookup.
    #[inline]
    pub fn max_matches(&self) -> usize {
        self.max_matches
    }

    /// Hash and index every complete block of the dictionary.
    pub fn add_all_blocks(&mut self) {
        let bs = self.block_size();
        for block in 0..self.next.len() {
            let start = block * bs;
            let h = self.hasher.hash(&self.source[start..start + bs]);
            self.add_block(block, h);
        }
        debug!(
            "indexed {} blocks of {} bytes into {} buckets",
            self.next.len(),
            bs,
            self.table.len()
        );
    }

    fn add_block(&mut self, block: usize, hash: u32) {
        // A block already linked into a chain is never re-added.
        if self.next[block].is_some() {
            return;
        }
        let bucket = self.bucket(hash);
        match self.table[bucket] {
            None => {
                self.table[bucket] = Some(block);
                self.last[block] = Some(block);
            }
            Some(head) => {
                let tail = self.last[head].unwrap_or(head);
                if tail == block {
                    return;
                }
                self.next[tail] = Some(block);
                self.last[head] = Some(block);
            }
        }
    }

    #[inline]
    fn bucket(&self, hash: u32) -> usize {
        hash as usize & self.mask
    }

    /// Search for the longest dictionary match of the block at
    /// `target[candidate..candidate + block_size]`.
    ///
    /// `target_start` marks the first byte of `target` not yet encoded; a
    /// match may grow left as far as that byte and right as far as the end
    /// of either buffer.  `best` is updated in place and only when a
    /// strictly longer match is found, so earlier candidates win ties.
    pub fn find_best_match(
        &self,
        hash: u32,
        candidate: usize,
        target_start: usize,
        target: &[u8],
        best: &mut Match,
    ) {
        let bs = self.block_size();
        let Some(block_bytes) = target.get(candidate..candidate + bs) else {
            return;
        };
        debug_assert!(candidate >= target_start);

        let mut examined = 0;
        let mut cursor = self.skip_non_matching(self.table[self.bucket(hash)], block_bytes);
        while let Some(block) = cursor {
            examined += 1;
            if examined > self.max_matches {
                break;
            }

            let mut source_offset = block * bs;
            let source_end = source_offset + bs;
            let mut target_offset = candidate - target_start;
            let mut size = bs;

            let left_limit = source_offset.min(target_offset);
            let left = backward_match(
                &self.source[..source_offset],
                &target[..candidate],
                left_limit,
            );
            source_offset -= left;
            target_offset -= left;
            size += left;

            let right_limit =
                (self.source.len() - source_end).min(target.len() - (candidate + bs));
            size += forward_match(
                &self.source[source_end..],
                &target[candidate + bs..],
                right_limit,
            );

            best.replace_if_better(size, source_offset, target_offset);

            cursor = self.skip_non_matching(self.next[block], block_bytes);
        }
    }

    /// Walk a chain from `start` to the first block whose bytes equal
    /// `block_bytes`, giving up after `MAX_PROBES` rejections.
    fn skip_non_matching(&self, start: Option<usize>, block_bytes: &[u8]) -> Option<usize> {
        let bs = self.block_size();
        let mut probes = 0;
        let mut cursor = start;
        while let Some(block) = cursor {
            let src = &self.source[block * bs..block * bs + bs];
            if src[0] == block_bytes[0] && src == block_bytes {
                return Some(block);
            }
            probes += 1;
            if probes > MAX_PROBES {
                return None;
            }
            cursor = self.next[block];
        }
        None
    }
}

/// Smallest power of two that is at least `len / 4 + 1`.
pub fn table_size_for(len: usize) -> Result<usize> {
    (len / 4 + 1)
        .checked_next_power_of_two()
        .filter(|&n| n > 0)
        .ok_or_else(|| VcdiffError::invalid(format!("hash table size overflow for {len} bytes")))
}

/// Verified candidates per lookup: 32 for large blocks, scaled up for
/// small blocks so the same number of dictionary bytes is covered.
pub fn max_matches_for(block_size: usize) -> usize {
    if block_size >= 32 {
        32
    } else {
        32 * (32 / block_size)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
