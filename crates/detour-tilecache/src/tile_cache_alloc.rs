//! Scratch memory for tile builds
//!
//! Every build decompresses a tile into memory that is only needed until the
//! tile has been handed to the navigation mesh. [`LinearAllocator`] serves
//! those requests from a few reusable blocks and forgets all of them at once
//! on [`LinearAllocator::reset`].

use detour_common::{Error, Result, Status};

/// Default size of an arena block
pub const DEFAULT_ARENA_BLOCK_SIZE: usize = 32 * 1024;

/// Handle to bytes handed out by a [`LinearAllocator`]
///
/// A handle is only valid until the next reset of the allocator that
/// produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaBuf {
    epoch: u64,
    block: usize,
    offset: usize,
    len: usize,
}

impl ArenaBuf {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Bump allocator over fixed size blocks
#[derive(Debug)]
pub struct LinearAllocator {
    block_size: usize,
    blocks: Vec<Vec<u8>>,
    /// Block currently served from
    current: usize,
    /// First free byte in the current block
    top: usize,
    epoch: u64,
    /// Bytes handed out since the last reset
    used: usize,
    high_water_mark: usize,
}

impl Default for LinearAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_ARENA_BLOCK_SIZE)
    }
}

impl LinearAllocator {
    /// Creates an allocator; no memory is taken until the first request
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size: block_size.max(1),
            blocks: Vec::new(),
            current: 0,
            top: 0,
            epoch: 0,
            used: 0,
            high_water_mark: 0,
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of blocks currently held
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Largest number of bytes live between two resets
    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    /// Invalidates every handle
    ///
    /// Blocks of the configured size are kept for reuse; blocks obtained for
    /// oversized requests are released.
    pub fn reset(&mut self) {
        let block_size = self.block_size;
        self.blocks.retain(|block| block.len() <= block_size);
        self.epoch = self.epoch.wrapping_add(1);
        self.current = 0;
        self.top = 0;
        self.used = 0;
    }

    /// Hands out `size` zeroed bytes
    ///
    /// A request larger than the block size gets a block of its own.
    pub fn alloc(&mut self, size: usize) -> Result<ArenaBuf> {
        let block = self.find_block(size)?;
        let buf = ArenaBuf {
            epoch: self.epoch,
            block,
            offset: self.top,
            len: size,
        };
        self.blocks[block][self.top..self.top + size].fill(0);
        self.top += size;
        self.used += size;
        self.high_water_mark = self.high_water_mark.max(self.used);
        Ok(buf)
    }

    fn find_block(&mut self, size: usize) -> Result<usize> {
        if let Some(block) = self.blocks.get(self.current) {
            if self.top + size <= block.len() {
                return Ok(self.current);
            }
        }

        // Move on to the next kept block that fits, skipping smaller ones
        let start = if self.blocks.is_empty() { 0 } else { self.current + 1 };
        if let Some(i) = (start..self.blocks.len()).find(|&i| self.blocks[i].len() >= size) {
            self.current = i;
            self.top = 0;
            return Ok(i);
        }

        let len = size.max(self.block_size);
        let mut block = Vec::new();
        block.try_reserve_exact(len).map_err(|_| {
            log::warn!("Arena could not obtain a block of {} bytes", len);
            Error::TileCache(Status::OutOfMemory)
        })?;
        block.resize(len, 0);
        self.blocks.push(block);
        self.current = self.blocks.len() - 1;
        self.top = 0;
        log::debug!("Arena grew to {} blocks", self.blocks.len());
        Ok(self.current)
    }

    fn check(&self, buf: &ArenaBuf) -> Result<()> {
        if buf.epoch != self.epoch || buf.block >= self.blocks.len() {
            return Err(Error::TileCache(Status::InvalidParam));
        }
        Ok(())
    }

    pub fn bytes(&self, buf: &ArenaBuf) -> Result<&[u8]> {
        self.check(buf)?;
        Ok(&self.blocks[buf.block][buf.offset..buf.offset + buf.len])
    }

    pub fn bytes_mut(&mut self, buf: &ArenaBuf) -> Result<&mut [u8]> {
        self.check(buf)?;
        Ok(&mut self.blocks[buf.block][buf.offset..buf.offset + buf.len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocations_share_a_block() {
        let mut arena = LinearAllocator::new(64);
        let a = arena.alloc(16).unwrap();
        let b = arena.alloc(16).unwrap();
        assert_eq!(arena.block_count(), 1);

        arena.bytes_mut(&a).unwrap().fill(1);
        arena.bytes_mut(&b).unwrap().fill(2);
        assert_eq!(arena.bytes(&a).unwrap(), &[1; 16]);
        assert_eq!(arena.bytes(&b).unwrap(), &[2; 16]);
        assert_eq!(arena.high_water_mark(), 32);
    }

    #[test]
    fn test_exhausted_block_grows() {
        let mut arena = LinearAllocator::new(64);
        arena.alloc(40).unwrap();
        arena.alloc(40).unwrap();
        assert_eq!(arena.block_count(), 2);

        // Oversized requests get their own block
        let big = arena.alloc(200).unwrap();
        assert_eq!(arena.block_count(), 3);
        assert_eq!(arena.bytes(&big).unwrap().len(), 200);
    }

    #[test]
    fn test_reset_rejects_stale_handles() {
        let mut arena = LinearAllocator::new(64);
        let stale = arena.alloc(8).unwrap();
        arena.reset();

        assert!(matches!(
            arena.bytes(&stale),
            Err(Error::TileCache(Status::InvalidParam))
        ));
        assert!(arena.bytes_mut(&stale).is_err());

        // Blocks are kept and reused
        let fresh = arena.alloc(8).unwrap();
        assert_eq!(arena.block_count(), 1);
        assert_eq!(arena.bytes(&fresh).unwrap(), &[0; 8]);
    }

    #[test]
    fn test_reused_memory_is_zeroed() {
        let mut arena = LinearAllocator::new(32);
        let a = arena.alloc(32).unwrap();
        arena.bytes_mut(&a).unwrap().fill(0xaa);
        arena.reset();
        let b = arena.alloc(32).unwrap();
        assert!(arena.bytes(&b).unwrap().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_kept_blocks_are_walked_in_order() {
        let mut arena = LinearAllocator::new(32);
        arena.alloc(32).unwrap();
        arena.alloc(20).unwrap();
        arena.alloc(32).unwrap();
        assert_eq!(arena.block_count(), 3);

        arena.reset();
        arena.alloc(32).unwrap();
        arena.alloc(20).unwrap();
        // Still fits behind the previous request in the second block
        arena.alloc(12).unwrap();
        arena.alloc(32).unwrap();
        assert_eq!(arena.block_count(), 3);
        assert_eq!(arena.high_water_mark(), 96);
    }

    #[test]
    fn test_reset_releases_oversized_blocks() {
        let mut arena = LinearAllocator::new(32);
        arena.alloc(16).unwrap();
        arena.alloc(4096).unwrap();
        assert_eq!(arena.block_count(), 2);

        arena.reset();
        assert_eq!(arena.block_count(), 1);
        let small = arena.alloc(32).unwrap();
        assert_eq!(arena.bytes(&small).unwrap().len(), 32);
        assert_eq!(arena.block_count(), 1);
        assert_eq!(arena.high_water_mark(), 4112);
    }
}
