//! Scatter/gather byte buffer
//!
//! Bytes live in a list of equally sized blocks; every block but the last is
//! full, so byte `p` is at block `p / block_size`, offset `p % block_size`.
//! Growth pushes new blocks and never moves existing bytes.

use std::fmt;
use std::io::IoSlice;

use super::block::Block;
use super::DEFAULT_BLOCK_SIZE;
use crate::config::BufferConfig;
use crate::error::contract_violation;
use crate::logging::log_block_alloc_failure;
use crate::refcount::{RefCounted, ThreadSafeRefCount};

/// Chunked, append-friendly byte buffer
///
/// Positional `read`/`write` carry no cursor; see
/// [`BufferStream`](super::BufferStream) for `std::io` access. There is no
/// internal locking: share through [`RefPtr`](crate::refcount::RefPtr)
/// for readers, and mutate only through a unique handle.
pub struct BufferArray {
    refs: ThreadSafeRefCount,
    blocks: Vec<Block>,
    len: usize,
    block_size: usize,
}

impl BufferArray {
    pub fn new() -> Self {
        Self::with_block_size(DEFAULT_BLOCK_SIZE)
    }

    #[track_caller]
    pub fn with_block_size(block_size: usize) -> Self {
        if block_size == 0 {
            contract_violation("buffer block size must be nonzero");
        }
        Self {
            refs: ThreadSafeRefCount::new(),
            blocks: Vec::new(),
            len: 0,
            block_size,
        }
    }

    pub fn from_config(config: &BufferConfig) -> Self {
        Self::with_block_size(config.block_size)
    }

    /// Total bytes stored
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Append `src`, topping off the last block before adding new ones.
    ///
    /// Returns the bytes appended; fewer than `src.len()` only if a block
    /// could not be allocated, in which case the buffer holds exactly the
    /// bytes reported.
    pub fn append(&mut self, src: &[u8]) -> usize {
        let mut appended = 0;
        if let Some(last) = self.blocks.last_mut() {
            appended += last.fill_from(src);
        }

        while appended < src.len() {
            let end = src.len().min(appended + self.block_size);
            let block = match self.new_block(&src[appended..end]) {
                Some(block) => block,
                None => {
                    log_block_alloc_failure(self.block_size, appended, src.len());
                    break;
                }
            };
            appended += block.len();
            self.blocks.push(block);
        }

        self.len += appended;
        appended
    }

    fn new_block(&mut self, chunk: &[u8]) -> Option<Block> {
        self.blocks.try_reserve(1).ok()?;
        Block::from_slice(chunk, self.block_size).ok()
    }

    /// Copy bytes starting at `pos` into `dst`.
    ///
    /// Returns the count copied: `dst.len()` clamped to the bytes available,
    /// and 0 when `pos` is at or past the end.
    pub fn read(&self, pos: usize, dst: &mut [u8]) -> usize {
        if pos >= self.len || dst.is_empty() {
            return 0;
        }
        let count = dst.len().min(self.len - pos);

        let (mut index, mut offset) = self.locate(pos);
        let mut copied = 0;
        while copied < count {
            let available = &self.blocks[index].as_slice()[offset..];
            let take = available.len().min(count - copied);
            dst[copied..copied + take].copy_from_slice(&available[..take]);
            copied += take;
            index += 1;
            offset = 0;
        }
        count
    }

    /// Overwrite bytes starting at `pos`; whatever runs past the end is
    /// appended.
    ///
    /// `pos` may equal `len()` (a plain append). Past the end nothing is
    /// written and 0 is returned.
    pub fn write(&mut self, pos: usize, src: &[u8]) -> usize {
        if pos > self.len || src.is_empty() {
            return 0;
        }
        let overlap = src.len().min(self.len - pos);

        if overlap > 0 {
            let (mut index, mut offset) = self.locate(pos);
            let mut copied = 0;
            while copied < overlap {
                let target = &mut self.blocks[index].as_mut_slice()[offset..];
                let take = target.len().min(overlap - copied);
                target[..take].copy_from_slice(&src[copied..copied + take]);
                copied += take;
                index += 1;
                offset = 0;
            }
        }

        overlap + self.append(&src[overlap..])
    }

    /// Block index and offset within it of byte `pos`
    pub fn find_block(&self, pos: usize) -> Option<(usize, usize)> {
        if pos >= self.len {
            return None;
        }
        Some(self.locate(pos))
    }

    #[inline]
    fn locate(&self, pos: usize) -> (usize, usize) {
        (pos / self.block_size, pos % self.block_size)
    }

    /// Filled region of block `index`
    pub fn block_start_end(&self, index: usize) -> Option<&[u8]> {
        self.blocks.get(index).map(Block::as_slice)
    }

    /// Filled regions of all blocks, in order
    pub fn blocks(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.blocks.iter().map(Block::as_slice)
    }

    /// Gather view for vectored writes
    pub fn io_slices(&self) -> Vec<IoSlice<'_>> {
        self.blocks().map(IoSlice::new).collect()
    }

    /// Contiguous copy of the whole buffer
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len);
        for block in self.blocks() {
            out.extend_from_slice(block);
        }
        out
    }
}

impl Default for BufferArray {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: `refs` is a field of this object.
unsafe impl RefCounted for BufferArray {
    fn ref_count(&self) -> &ThreadSafeRefCount {
        &self.refs
    }
}

impl fmt::Debug for BufferArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferArray")
            .field("len", &self.len)
            .field("blocks", &self.blocks.len())
            .field("block_size", &self.block_size)
            .field("refs", &self.refs.num_refs())
            .finish()
    }
}
