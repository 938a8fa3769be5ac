//! Inode store manager.
//!
//! Owns the lock protecting the packed inode table (`SPEC_FULL.md` §5,
//! lock 2) and the three operations the rest of the filesystem needs:
//! [`InodeStoreManager::find`], [`InodeStoreManager::append`], and
//! [`InodeStoreManager::update`]. Writers that also mutate `inodes_count`
//! take the superblock lock *after* this one — never the reverse.

use crate::cancel::{self, CancellationToken};
use crate::device::BlockDevice;
use crate::error::{Error, Result};
use crate::layout::{InodeRecord, InodeStoreBlock, INODE_STORE_BLOCK, MAX_INODES};
use crate::superblock::SuperblockManager;
use log::debug;
use std::sync::Mutex;

/// Guards the packed inode table — lock 2 of `SPEC_FULL.md` §5. Every
/// acquisition goes through [`cancel::guarded_lock`].
pub struct InodeStoreManager {
    inner: Mutex<InodeStoreBlock>,
    cancel: CancellationToken,
}

impl InodeStoreManager {
    /// Reads block 1 into an in-memory buffer, with a fresh,
    /// never-cancelled token. Use
    /// [`InodeStoreManager::load_with_cancellation`] to share a token
    /// with the rest of a mounted filesystem.
    pub fn load(dev: &dyn BlockDevice) -> Result<Self> {
        Self::load_with_cancellation(dev, CancellationToken::new())
    }

    /// Reads block 1 into an in-memory buffer, honoring `cancel` on every
    /// lock acquisition.
    pub fn load_with_cancellation(dev: &dyn BlockDevice, cancel: CancellationToken) -> Result<Self> {
        let bytes = dev.read_block(INODE_STORE_BLOCK)?;
        Ok(Self {
            inner: Mutex::new(InodeStoreBlock::from_bytes(&bytes)?),
            cancel,
        })
    }

    fn persist(&self, dev: &dyn BlockDevice, store: &InodeStoreBlock) -> Result<()> {
        dev.write_block(INODE_STORE_BLOCK, &store.to_bytes())?;
        dev.sync_block(INODE_STORE_BLOCK)
    }

    /// Linear scan over the first `inodes_count` entries for `inode_no`.
    pub fn find(&self, inode_no: u64, inodes_count: u64) -> Result<InodeRecord> {
        let store = cancel::guarded_lock(&self.inner, &self.cancel)?;
        for i in 0..inodes_count as usize {
            if let Some(rec) = store.get(i) {
                if rec.inode_no == inode_no {
                    return Ok(rec);
                }
            }
        }
        Err(Error::NotFound)
    }

    /// True if any record among the first `inodes_count` entries carries
    /// `inode_no`. Used by the "lowest unused >= start_ino" allocation
    /// scan in `crate::fs` (`SPEC_FULL.md` §9).
    pub fn contains(&self, inode_no: u64, inodes_count: u64) -> Result<bool> {
        match self.find(inode_no, inodes_count) {
            Ok(_) => Ok(true),
            Err(Error::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Writes `record` at index `inodes_count`, increments the count, and
    /// syncs the store block then the superblock. Fails with
    /// [`Error::NoSpace`] if the store is already full.
    pub fn append(
        &self,
        dev: &dyn BlockDevice,
        sb: &SuperblockManager,
        record: InodeRecord,
    ) -> Result<()> {
        let mut store = cancel::guarded_lock(&self.inner, &self.cancel)?;
        let count = sb.inode_count_snapshot()? as usize;
        if count >= MAX_INODES {
            return Err(Error::NoSpace);
        }
        store.set(count, record);
        self.persist(dev, &store)?;
        sb.bump_inode_count(dev)?;
        debug!("appended inode {} at index {count}", record.inode_no);
        Ok(())
    }

    /// Locates `record.inode_no` among the first `inodes_count` entries
    /// and overwrites it in place.
    pub fn update(&self, dev: &dyn BlockDevice, inodes_count: u64, record: InodeRecord) -> Result<()> {
        let mut store = cancel::guarded_lock(&self.inner, &self.cancel)?;
        for i in 0..inodes_count as usize {
            if store.get(i).map(|r| r.inode_no) == Some(record.inode_no) {
                store.set(i, record);
                self.persist(dev, &store)?;
                return Ok(());
            }
        }
        Err(Error::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemBlockDevice;
    use crate::layout::{FileType, SuperBlock, SUPERBLOCK_BLOCK, TOTAL_TRACKED_BLOCKS};

    fn fresh() -> (MemBlockDevice, SuperblockManager, InodeStoreManager) {
        let dev = MemBlockDevice::new(TOTAL_TRACKED_BLOCKS);
        dev.write_block(SUPERBLOCK_BLOCK, &SuperBlock::fresh().to_bytes())
            .unwrap();
        dev.write_block(INODE_STORE_BLOCK, &InodeStoreBlock::empty().to_bytes())
            .unwrap();
        let sb = SuperblockManager::load(&dev).unwrap();
        let store = InodeStoreManager::load(&dev).unwrap();
        (dev, sb, store)
    }

    #[test]
    fn append_then_find() {
        let (dev, sb, store) = fresh();
        let rec = InodeRecord {
            mode: FileType::Regular,
            inode_no: 10,
            data_block_number: 6,
            payload: 0,
        };
        store.append(&dev, &sb, rec).unwrap();
        let found = store.find(10, sb.inode_count_snapshot().unwrap()).unwrap();
        assert_eq!(found.data_block_number, 6);
    }

    #[test]
    fn append_fails_when_full() {
        let (dev, sb, store) = fresh();
        for i in 0..MAX_INODES as u64 {
            let rec = InodeRecord {
                mode: FileType::Regular,
                inode_no: i + 1,
                data_block_number: 6,
                payload: 0,
            };
            store.append(&dev, &sb, rec).unwrap();
        }
        let rec = InodeRecord {
            mode: FileType::Regular,
            inode_no: 9999,
            data_block_number: 6,
            payload: 0,
        };
        assert!(matches!(store.append(&dev, &sb, rec), Err(Error::NoSpace)));
    }

    #[test]
    fn update_overwrites_in_place() {
        let (dev, sb, store) = fresh();
        let rec = InodeRecord {
            mode: FileType::Regular,
            inode_no: 5,
            data_block_number: 6,
            payload: 0,
        };
        store.append(&dev, &sb, rec).unwrap();
        let updated = InodeRecord {
            payload: 99,
            ..rec
        };
        store
            .update(&dev, sb.inode_count_snapshot().unwrap(), updated)
            .unwrap();
        let found = store.find(5, sb.inode_count_snapshot().unwrap()).unwrap();
        assert_eq!(found.file_size(), 99);
    }

    #[test]
    fn update_missing_inode_not_found() {
        let (dev, sb, store) = fresh();
        let rec = InodeRecord {
            mode: FileType::Regular,
            inode_no: 123,
            data_block_number: 6,
            payload: 0,
        };
        assert!(matches!(
            store.update(&dev, sb.inode_count_snapshot().unwrap(), rec),
            Err(Error::NotFound)
        ));
    }

    #[test]
    fn cancelled_token_refuses_the_lock_instead_of_blocking() {
        let dev = MemBlockDevice::new(TOTAL_TRACKED_BLOCKS);
        dev.write_block(SUPERBLOCK_BLOCK, &SuperBlock::fresh().to_bytes())
            .unwrap();
        dev.write_block(INODE_STORE_BLOCK, &InodeStoreBlock::empty().to_bytes())
            .unwrap();
        let sb = SuperblockManager::load(&dev).unwrap();
        let token = crate::cancel::CancellationToken::new();
        let store = InodeStoreManager::load_with_cancellation(&dev, token.clone()).unwrap();

        let rec = InodeRecord {
            mode: FileType::Regular,
            inode_no: 10,
            data_block_number: 6,
            payload: 0,
        };
        store.append(&dev, &sb, rec).unwrap();

        token.cancel();
        assert!(matches!(
            store.find(10, sb.inode_count_snapshot().unwrap()),
            Err(Error::Interrupted)
        ));
        assert!(matches!(
            store.append(&dev, &sb, rec),
            Err(Error::Interrupted)
        ));
        assert!(matches!(
            store.update(&dev, sb.inode_count_snapshot().unwrap(), rec),
            Err(Error::Interrupted)
        ));
    }
}
