//! Block device adapter.
//!
//! Every other module talks to storage exclusively through [`BlockDevice`].
//! Two concrete adapters ship with this crate: [`MemBlockDevice`], an
//! in-memory store used by unit tests, and [`FileBlockDevice`], which backs
//! the mkfs CLI and the integration suite with a real file.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Mutex;

/// Fixed block size used throughout the on-disk format.
pub const BLOCK_SIZE: usize = 4096;

/// A single block's worth of bytes.
pub type Block = [u8; BLOCK_SIZE];

/// An opaque, block-addressable byte store.
///
/// Implementations are expected to serialize concurrent access to the same
/// block internally; callers rely on that guarantee when reading and
/// writing the same data block from concurrent filesystem operations.
pub trait BlockDevice: Send + Sync {
    /// Reads block `n` into a freshly allocated buffer.
    fn read_block(&self, n: u64) -> Result<Block>;

    /// Writes `buf` to block `n`.
    fn write_block(&self, n: u64, buf: &Block) -> Result<()>;

    /// Forces block `n` to stable storage. For adapters without a separate
    /// write-back cache this is a no-op beyond what `write_block` already
    /// did.
    fn sync_block(&self, n: u64) -> Result<()>;

    /// The total number of addressable blocks.
    fn block_count(&self) -> u64;
}

/// An in-memory [`BlockDevice`], used by unit tests and anywhere a real
/// file is unnecessary.
pub struct MemBlockDevice {
    blocks: Mutex<Vec<Block>>,
}

impl MemBlockDevice {
    /// Creates a zero-filled device with `block_count` blocks.
    pub fn new(block_count: u64) -> Self {
        Self {
            blocks: Mutex::new(vec![[0u8; BLOCK_SIZE]; block_count as usize]),
        }
    }
}

impl BlockDevice for MemBlockDevice {
    fn read_block(&self, n: u64) -> Result<Block> {
        let blocks = self.blocks.lock()?;
        blocks
            .get(n as usize)
            .copied()
            .ok_or(Error::InvalidArg("block index out of range"))
    }

    fn write_block(&self, n: u64, buf: &Block) -> Result<()> {
        let mut blocks = self.blocks.lock()?;
        let slot = blocks
            .get_mut(n as usize)
            .ok_or(Error::InvalidArg("block index out of range"))?;
        *slot = *buf;
        Ok(())
    }

    fn sync_block(&self, _n: u64) -> Result<()> {
        Ok(())
    }

    fn block_count(&self) -> u64 {
        self.blocks.lock().map(|b| b.len() as u64).unwrap_or(0)
    }
}

/// A [`BlockDevice`] backed by a real file, used by the mkfs CLI and the
/// integration tests.
pub struct FileBlockDevice {
    file: Mutex<File>,
    block_count: u64,
}

impl FileBlockDevice {
    /// Opens `file` as a block device with `block_count` addressable
    /// blocks, extending the file to the required length if it is
    /// shorter.
    pub fn new(mut file: File, block_count: u64) -> Result<Self> {
        let required_len = block_count * BLOCK_SIZE as u64;
        let current_len = file.seek(SeekFrom::End(0))?;
        if current_len < required_len {
            file.set_len(required_len)?;
        }
        Ok(Self {
            file: Mutex::new(file),
            block_count,
        })
    }
}

impl BlockDevice for FileBlockDevice {
    fn read_block(&self, n: u64) -> Result<Block> {
        if n >= self.block_count {
            return Err(Error::InvalidArg("block index out of range"));
        }
        let mut file = self.file.lock()?;
        file.seek(SeekFrom::Start(n * BLOCK_SIZE as u64))?;
        let mut buf = [0u8; BLOCK_SIZE];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn write_block(&self, n: u64, buf: &Block) -> Result<()> {
        if n >= self.block_count {
            return Err(Error::InvalidArg("block index out of range"));
        }
        let mut file = self.file.lock()?;
        file.seek(SeekFrom::Start(n * BLOCK_SIZE as u64))?;
        file.write_all(buf)?;
        Ok(())
    }

    fn sync_block(&self, _n: u64) -> Result<()> {
        let file = self.file.lock()?;
        file.sync_data()?;
        Ok(())
    }

    fn block_count(&self) -> u64 {
        self.block_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_device_round_trips_a_block() {
        let dev = MemBlockDevice::new(4);
        let mut buf = [0u8; BLOCK_SIZE];
        buf[0] = 0xAB;
        dev.write_block(2, &buf).unwrap();
        assert_eq!(dev.read_block(2).unwrap(), buf);
        assert_eq!(dev.read_block(0).unwrap(), [0u8; BLOCK_SIZE]);
    }

    #[test]
    fn mem_device_rejects_out_of_range_block() {
        let dev = MemBlockDevice::new(2);
        assert!(matches!(
            dev.read_block(5),
            Err(Error::InvalidArg(_))
        ));
    }

    #[test]
    fn file_device_round_trips_a_block() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let file = tmp.reopen().unwrap();
        let dev = FileBlockDevice::new(file, 4).unwrap();
        let mut buf = [0u8; BLOCK_SIZE];
        buf[10] = 7;
        dev.write_block(1, &buf).unwrap();
        dev.sync_block(1).unwrap();
        assert_eq!(dev.read_block(1).unwrap(), buf);
    }
}
