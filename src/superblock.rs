//! Free-space and inode-count allocator.
//!
//! Owns the in-memory mirror of the superblock and the lock protecting
//! it. The on-disk block is rewritten on every mutation so it stays the
//! single source of truth a remount would see.

use crate::cancel::{self, CancellationToken};
use crate::device::BlockDevice;
use crate::error::{Error, Result};
use crate::layout::{SuperBlock, FIRST_FREE_BLOCK, SUPERBLOCK_BLOCK, TOTAL_TRACKED_BLOCKS};
use log::{debug, warn};
use std::sync::Mutex;

/// Guards the superblock's `free_blocks` bitmap and `inodes_count` — lock
/// 1 of `SPEC_FULL.md` §5. Every acquisition goes through
/// [`cancel::guarded_lock`], so a cancelled `cancel` token is honored
/// before the thread would otherwise block.
pub struct SuperblockManager {
    inner: Mutex<SuperBlock>,
    cancel: CancellationToken,
}

impl SuperblockManager {
    /// Wraps an already-loaded superblock with a fresh, never-cancelled
    /// token. Use [`SuperblockManager::with_cancellation`] to share a
    /// token with the rest of a mounted filesystem.
    pub fn new(sb: SuperBlock) -> Self {
        Self::with_cancellation(sb, CancellationToken::new())
    }

    /// Wraps an already-loaded superblock, honoring `cancel` on every
    /// lock acquisition.
    pub fn with_cancellation(sb: SuperBlock, cancel: CancellationToken) -> Self {
        Self {
            inner: Mutex::new(sb),
            cancel,
        }
    }

    /// Reads block 0, validates it, and wraps it.
    pub fn load(dev: &dyn BlockDevice) -> Result<Self> {
        Self::load_with_cancellation(dev, CancellationToken::new())
    }

    /// Reads block 0, validates it, and wraps it, honoring `cancel` on
    /// every lock acquisition.
    pub fn load_with_cancellation(dev: &dyn BlockDevice, cancel: CancellationToken) -> Result<Self> {
        let bytes = dev.read_block(SUPERBLOCK_BLOCK)?;
        Ok(Self::with_cancellation(SuperBlock::from_bytes(&bytes)?, cancel))
    }

    /// Returns a snapshot of the current in-memory superblock.
    pub fn snapshot(&self) -> Result<SuperBlock> {
        Ok(*cancel::guarded_lock(&self.inner, &self.cancel)?)
    }

    fn persist(&self, dev: &dyn BlockDevice, sb: &SuperBlock) -> Result<()> {
        dev.write_block(SUPERBLOCK_BLOCK, &sb.to_bytes())?;
        dev.sync_block(SUPERBLOCK_BLOCK)
    }

    /// Scans `free_blocks` starting at [`FIRST_FREE_BLOCK`], clears the
    /// lowest free bit, persists the superblock, and returns the claimed
    /// block number. Fails with [`Error::NoSpace`] if no bit in
    /// `[FIRST_FREE_BLOCK, TOTAL_TRACKED_BLOCKS)` is set.
    pub fn allocate_block(&self, dev: &dyn BlockDevice) -> Result<u64> {
        let mut sb = cancel::guarded_lock(&self.inner, &self.cancel)?;
        for bit in FIRST_FREE_BLOCK..TOTAL_TRACKED_BLOCKS {
            if sb.free_blocks & (1 << bit) != 0 {
                sb.free_blocks &= !(1 << bit);
                self.persist(dev, &sb)?;
                debug!("allocated block {bit}");
                return Ok(bit);
            }
        }
        warn!("block allocator exhausted");
        Err(Error::NoSpace)
    }

    /// Returns the current `inodes_count`.
    pub fn inode_count_snapshot(&self) -> Result<u64> {
        Ok(cancel::guarded_lock(&self.inner, &self.cancel)?.inodes_count)
    }

    /// Rewrites the in-memory superblock to disk without mutating it,
    /// used by `unmount`/`put_super` to guarantee a final durable copy.
    pub fn flush(&self, dev: &dyn BlockDevice) -> Result<()> {
        let sb = cancel::guarded_lock(&self.inner, &self.cancel)?;
        self.persist(dev, &sb)
    }

    /// Increments `inodes_count` by one and persists the superblock.
    pub fn bump_inode_count(&self, dev: &dyn BlockDevice) -> Result<u64> {
        let mut sb = cancel::guarded_lock(&self.inner, &self.cancel)?;
        sb.inodes_count += 1;
        self.persist(dev, &sb)?;
        Ok(sb.inodes_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemBlockDevice;
    use crate::layout::TOTAL_TRACKED_BLOCKS;

    fn fresh_device() -> MemBlockDevice {
        let dev = MemBlockDevice::new(TOTAL_TRACKED_BLOCKS);
        dev.write_block(SUPERBLOCK_BLOCK, &SuperBlock::fresh().to_bytes())
            .unwrap();
        dev
    }

    #[test]
    fn allocates_lowest_free_block_first() {
        let dev = fresh_device();
        let mgr = SuperblockManager::load(&dev).unwrap();
        assert_eq!(mgr.allocate_block(&dev).unwrap(), FIRST_FREE_BLOCK);
        assert_eq!(mgr.allocate_block(&dev).unwrap(), FIRST_FREE_BLOCK + 1);
    }

    #[test]
    fn exhausts_with_no_space() {
        let dev = fresh_device();
        let mgr = SuperblockManager::load(&dev).unwrap();
        let available = TOTAL_TRACKED_BLOCKS - FIRST_FREE_BLOCK;
        for _ in 0..available {
            mgr.allocate_block(&dev).unwrap();
        }
        assert!(matches!(mgr.allocate_block(&dev), Err(Error::NoSpace)));
    }

    #[test]
    fn inode_count_bumps_and_persists() {
        let dev = fresh_device();
        let mgr = SuperblockManager::load(&dev).unwrap();
        assert_eq!(mgr.inode_count_snapshot().unwrap(), 3);
        assert_eq!(mgr.bump_inode_count(&dev).unwrap(), 4);

        let reloaded = SuperblockManager::load(&dev).unwrap();
        assert_eq!(reloaded.inode_count_snapshot().unwrap(), 4);
    }

    #[test]
    fn cancelled_token_refuses_the_lock_instead_of_blocking() {
        let dev = fresh_device();
        let token = crate::cancel::CancellationToken::new();
        let mgr = SuperblockManager::load_with_cancellation(&dev, token.clone()).unwrap();
        assert_eq!(mgr.inode_count_snapshot().unwrap(), 3);

        token.cancel();
        assert!(matches!(mgr.inode_count_snapshot(), Err(Error::Interrupted)));
        assert!(matches!(mgr.allocate_block(&dev), Err(Error::Interrupted)));
    }
}
