//! Directory manager.
//!
//! Operates on a single directory inode's data block: a packed array of
//! [`DirRecord`]s. This module holds no lock of its own — callers in
//! `crate::fs` serialize child insertions through a shared
//! directory-children lock before calling [`append_child`].

use crate::device::BlockDevice;
use crate::error::{Error, Result};
use crate::inode_store::InodeStoreManager;
use crate::layout::{DirBlock, DirRecord, InodeRecord};
use log::warn;

/// Scans the first `children_count` records of `data_block` for `name`,
/// returning the matching child's inode number.
pub fn lookup(dev: &dyn BlockDevice, data_block: u64, children_count: u64, name: &str) -> Result<u64> {
    let bytes = dev.read_block(data_block)?;
    let block = DirBlock::from_bytes(&bytes, children_count as usize)?;
    block
        .entries()
        .iter()
        .find(|e| e.filename == name)
        .map(|e| e.inode_no)
        .ok_or(Error::NotFound)
}

/// Reads every record of `data_block` in stored order, for
/// `iterate_dir`.
pub fn read_all(dev: &dyn BlockDevice, data_block: u64, children_count: u64) -> Result<Vec<DirRecord>> {
    let bytes = dev.read_block(data_block)?;
    let block = DirBlock::from_bytes(&bytes, children_count as usize)?;
    Ok(block.entries().to_vec())
}

/// Appends `(name, child_inode_no)` to `parent`'s data block, then
/// updates `parent.dir_children_count` via `inode_store.update`. Fails
/// with [`Error::DirFull`] if the data block cannot hold another record.
pub fn append_child(
    dev: &dyn BlockDevice,
    inode_store: &InodeStoreManager,
    inodes_count: u64,
    parent: InodeRecord,
    name: &str,
    child_inode_no: u64,
) -> Result<()> {
    let data_block = parent.data_block_number;
    let children_count = parent.dir_children_count();

    let bytes = dev.read_block(data_block)?;
    let mut block = DirBlock::from_bytes(&bytes, children_count as usize)?;
    let record = DirRecord::new(name, child_inode_no)?;
    if let Err(e) = block.push(record) {
        warn!("directory at block {data_block} is full");
        return Err(e);
    }

    dev.write_block(data_block, &block.to_bytes())?;
    dev.sync_block(data_block)?;

    let updated_parent = InodeRecord {
        payload: children_count + 1,
        ..parent
    };
    inode_store.update(dev, inodes_count, updated_parent)
}
