//! On-disk layout and byte-level codecs.
//!
//! This module defines the packed, little-endian records this filesystem
//! persists: the superblock, inode records, and directory records. Each
//! type exposes a `to_bytes`/`from_bytes` pair operating on a fixed-size
//! buffer; there is no implicit padding between fields and no derived
//! serializer in the loop — the format is a fixed byte layout, not a
//! general serialization target.

use crate::device::{Block, BLOCK_SIZE};
use crate::error::{Error, Result};

/// Magic number identifying a valid on-disk image.
pub const MAGIC: u64 = 0x1003_2013;
/// The only on-disk format version this implementation understands.
pub const VERSION: u64 = 1;

/// Block holding the superblock.
pub const SUPERBLOCK_BLOCK: u64 = 0;
/// Block holding the packed inode store.
pub const INODE_STORE_BLOCK: u64 = 1;
/// First block of the journal area.
pub const JOURNAL_START_BLOCK: u64 = 2;
/// Number of blocks reserved for the journal area on a fresh image.
pub const JOURNAL_BLOCKS: u64 = 2;
/// Root directory's data block.
pub const ROOT_DIR_DATA_BLOCK: u64 = 4;
/// Welcome file's data block on a fresh image.
pub const WELCOME_FILE_DATA_BLOCK: u64 = 5;
/// First block available to the allocator on a fresh image. Blocks
/// `0..WELCOME_FILE_DATA_BLOCK` inclusive are pre-claimed by mkfs; see
/// `SPEC_FULL.md` §9 on reserved-constant drift between §3 and §6 — this
/// crate follows §6, the authoritative table, which occupies block 5 with
/// the welcome file rather than leaving it free.
pub const FIRST_FREE_BLOCK: u64 = WELCOME_FILE_DATA_BLOCK + 1;
/// Total number of blocks tracked by the superblock's 64-bit free-block
/// bitmap.
pub const TOTAL_TRACKED_BLOCKS: u64 = 64;

pub const ROOT_INODE_NUMBER: u64 = 1;
pub const JOURNAL_INODE_NUMBER: u64 = 2;
pub const WELCOME_INODE_NUMBER: u64 = 3;
/// Lowest inode number `create`/`mkdir` may assign to a new object.
pub const FIRST_ALLOCATABLE_INODE: u64 = 4;

/// Number of packed inode records in the inode store.
///
/// `N = min(BLOCK_SIZE / size_of(inode), 64)`, per `SPEC_FULL.md` §3.
pub const INODE_RECORD_SIZE: usize = 32;
pub const MAX_INODES: usize = {
    let by_block = BLOCK_SIZE / INODE_RECORD_SIZE;
    if by_block < 64 { by_block } else { 64 }
};

/// Maximum filename length, not counting the trailing NUL.
pub const MAX_FILENAME_LEN: usize = 254;
/// On-disk size of one directory record: a 255-byte NUL-terminated
/// filename followed by an 8-byte child inode number.
pub const DIR_RECORD_SIZE: usize = 255 + 8;
/// Number of directory records that fit in one data block.
pub const MAX_DIR_ENTRIES: usize = BLOCK_SIZE / DIR_RECORD_SIZE;

/// The type of a filesystem object, stored in an inode's `mode` field.
///
/// Uses the same bit semantics as POSIX `S_IFREG`/`S_IFDIR` in spirit,
/// encoded here as a plain discriminant rather than the real POSIX
/// constants, since this crate has no other caller that needs bit
/// compatibility with `<sys/stat.h>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum FileType {
    Regular = 1,
    Directory = 2,
}

impl TryFrom<u64> for FileType {
    type Error = Error;
    fn try_from(v: u64) -> Result<Self> {
        match v {
            1 => Ok(FileType::Regular),
            2 => Ok(FileType::Directory),
            _ => Err(Error::InvalidArg("unrecognized inode mode")),
        }
    }
}

/// On-disk superblock, occupying block 0 in its entirety.
#[derive(Debug, Clone, Copy)]
pub struct SuperBlock {
    pub version: u64,
    pub magic: u64,
    pub block_size: u64,
    pub inodes_count: u64,
    /// Bit *i* set means block *i* is free.
    pub free_blocks: u64,
}

impl SuperBlock {
    /// Builds the superblock for a freshly formatted image: three inodes
    /// in use (root, journal, welcome), and every reserved block cleared.
    pub fn fresh() -> Self {
        let mut free_blocks = !0u64;
        for b in 0..FIRST_FREE_BLOCK {
            free_blocks &= !(1 << b);
        }
        Self {
            version: VERSION,
            magic: MAGIC,
            block_size: BLOCK_SIZE as u64,
            inodes_count: 3,
            free_blocks,
        }
    }

    pub fn to_bytes(&self) -> Block {
        let mut bytes = [0u8; BLOCK_SIZE];
        bytes[0..8].copy_from_slice(&self.version.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.magic.to_le_bytes());
        bytes[16..24].copy_from_slice(&self.block_size.to_le_bytes());
        bytes[24..32].copy_from_slice(&self.inodes_count.to_le_bytes());
        bytes[32..40].copy_from_slice(&self.free_blocks.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &Block) -> Result<Self> {
        let magic = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
        if magic != MAGIC {
            return Err(Error::BadMagic {
                expected: MAGIC,
                found: magic,
            });
        }
        let block_size = u64::from_le_bytes(bytes[16..24].try_into().unwrap());
        if block_size != BLOCK_SIZE as u64 {
            return Err(Error::BadBlockSize {
                expected: BLOCK_SIZE as u64,
                found: block_size,
            });
        }
        let version = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
        if version != VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        let inodes_count = u64::from_le_bytes(bytes[24..32].try_into().unwrap());
        let free_blocks = u64::from_le_bytes(bytes[32..40].try_into().unwrap());
        Ok(Self {
            version,
            magic,
            block_size,
            inodes_count,
            free_blocks,
        })
    }
}

/// One packed inode record within the inode store.
#[derive(Debug, Clone, Copy)]
pub struct InodeRecord {
    pub mode: FileType,
    pub inode_no: u64,
    pub data_block_number: u64,
    /// `dir_children_count` for a directory, `file_size` for a regular
    /// file — the tagged-union payload of `SPEC_FULL.md` §3, tagged by
    /// `mode` rather than stored with an explicit discriminant, since the
    /// two interpretations never coexist for a given inode.
    pub payload: u64,
}

impl InodeRecord {
    pub fn is_dir(&self) -> bool {
        self.mode == FileType::Directory
    }

    pub fn is_regular(&self) -> bool {
        self.mode == FileType::Regular
    }

    pub fn dir_children_count(&self) -> u64 {
        debug_assert_eq!(self.mode, FileType::Directory);
        self.payload
    }

    pub fn file_size(&self) -> u64 {
        debug_assert_eq!(self.mode, FileType::Regular);
        self.payload
    }

    fn to_bytes(self) -> [u8; INODE_RECORD_SIZE] {
        let mut bytes = [0u8; INODE_RECORD_SIZE];
        bytes[0..8].copy_from_slice(&(self.mode as u64).to_le_bytes());
        bytes[8..16].copy_from_slice(&self.inode_no.to_le_bytes());
        bytes[16..24].copy_from_slice(&self.data_block_number.to_le_bytes());
        bytes[24..32].copy_from_slice(&self.payload.to_le_bytes());
        bytes
    }

    fn from_bytes(bytes: &[u8; INODE_RECORD_SIZE]) -> Result<Self> {
        let mode = FileType::try_from(u64::from_le_bytes(bytes[0..8].try_into().unwrap()))?;
        let inode_no = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
        let data_block_number = u64::from_le_bytes(bytes[16..24].try_into().unwrap());
        let payload = u64::from_le_bytes(bytes[24..32].try_into().unwrap());
        Ok(Self {
            mode,
            inode_no,
            data_block_number,
            payload,
        })
    }

    /// An all-zero slot is never a valid inode record (`inode_no` must be
    /// `>= 1`), so a zeroed slot reliably marks "unused".
    fn is_unused(bytes: &[u8; INODE_RECORD_SIZE]) -> bool {
        bytes.iter().all(|&b| b == 0)
    }
}

/// The packed inode store: up to [`MAX_INODES`] records, one block.
#[derive(Clone)]
pub struct InodeStoreBlock {
    records: Vec<Option<InodeRecord>>,
}

impl InodeStoreBlock {
    pub fn empty() -> Self {
        Self {
            records: vec![None; MAX_INODES],
        }
    }

    pub fn get(&self, index: usize) -> Option<InodeRecord> {
        self.records.get(index).copied().flatten()
    }

    pub fn set(&mut self, index: usize, record: InodeRecord) {
        self.records[index] = Some(record);
    }

    pub fn to_bytes(&self) -> Block {
        let mut bytes = [0u8; BLOCK_SIZE];
        for (i, rec) in self.records.iter().enumerate() {
            let start = i * INODE_RECORD_SIZE;
            if let Some(rec) = rec {
                bytes[start..start + INODE_RECORD_SIZE].copy_from_slice(&rec.to_bytes());
            }
        }
        bytes
    }

    pub fn from_bytes(bytes: &Block) -> Result<Self> {
        let mut records = Vec::with_capacity(MAX_INODES);
        for i in 0..MAX_INODES {
            let start = i * INODE_RECORD_SIZE;
            let slot: [u8; INODE_RECORD_SIZE] =
                bytes[start..start + INODE_RECORD_SIZE].try_into().unwrap();
            if InodeRecord::is_unused(&slot) {
                records.push(None);
            } else {
                records.push(Some(InodeRecord::from_bytes(&slot)?));
            }
        }
        Ok(Self { records })
    }
}

/// One directory record: a NUL-terminated filename and a child inode
/// number.
#[derive(Debug, Clone)]
pub struct DirRecord {
    pub filename: String,
    pub inode_no: u64,
}

impl DirRecord {
    pub fn new(filename: &str, inode_no: u64) -> Result<Self> {
        if filename.is_empty() || filename.len() > MAX_FILENAME_LEN || filename.contains('\0') {
            return Err(Error::InvalidArg("invalid filename"));
        }
        Ok(Self {
            filename: filename.to_string(),
            inode_no,
        })
    }

    fn to_bytes(&self) -> [u8; DIR_RECORD_SIZE] {
        let mut bytes = [0u8; DIR_RECORD_SIZE];
        let name_bytes = self.filename.as_bytes();
        bytes[..name_bytes.len()].copy_from_slice(name_bytes);
        bytes[255..263].copy_from_slice(&self.inode_no.to_le_bytes());
        bytes
    }

    fn from_bytes(bytes: &[u8; DIR_RECORD_SIZE]) -> Result<Self> {
        let nul = bytes[..255].iter().position(|&b| b == 0).unwrap_or(255);
        let filename = String::from_utf8_lossy(&bytes[..nul]).into_owned();
        let inode_no = u64::from_le_bytes(bytes[255..263].try_into().unwrap());
        Ok(Self { filename, inode_no })
    }
}

/// A directory's data block: up to [`MAX_DIR_ENTRIES`] packed records.
pub struct DirBlock {
    entries: Vec<DirRecord>,
}

impl DirBlock {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[DirRecord] {
        &self.entries
    }

    pub fn push(&mut self, record: DirRecord) -> Result<()> {
        if self.entries.len() >= MAX_DIR_ENTRIES {
            return Err(Error::DirFull);
        }
        self.entries.push(record);
        Ok(())
    }

    pub fn to_bytes(&self) -> Block {
        let mut bytes = [0u8; BLOCK_SIZE];
        for (i, entry) in self.entries.iter().enumerate() {
            let start = i * DIR_RECORD_SIZE;
            bytes[start..start + DIR_RECORD_SIZE].copy_from_slice(&entry.to_bytes());
        }
        bytes
    }

    /// Parses the first `count` records out of a raw data block.
    pub fn from_bytes(bytes: &Block, count: usize) -> Result<Self> {
        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let start = i * DIR_RECORD_SIZE;
            let slot: [u8; DIR_RECORD_SIZE] =
                bytes[start..start + DIR_RECORD_SIZE].try_into().unwrap();
            entries.push(DirRecord::from_bytes(&slot)?);
        }
        Ok(Self { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superblock_round_trips() {
        let sb = SuperBlock::fresh();
        let bytes = sb.to_bytes();
        let back = SuperBlock::from_bytes(&bytes).unwrap();
        assert_eq!(back.magic, MAGIC);
        assert_eq!(back.inodes_count, 3);
        assert_eq!(back.free_blocks, sb.free_blocks);
    }

    #[test]
    fn superblock_rejects_bad_magic() {
        let mut bytes = SuperBlock::fresh().to_bytes();
        bytes[8] = 0xFF;
        assert!(matches!(
            SuperBlock::from_bytes(&bytes),
            Err(Error::BadMagic { .. })
        ));
    }

    #[test]
    fn inode_record_round_trips() {
        let rec = InodeRecord {
            mode: FileType::Regular,
            inode_no: 3,
            data_block_number: 5,
            payload: 41,
        };
        let mut store = InodeStoreBlock::empty();
        store.set(2, rec);
        let bytes = store.to_bytes();
        let back = InodeStoreBlock::from_bytes(&bytes).unwrap();
        let got = back.get(2).unwrap();
        assert_eq!(got.inode_no, 3);
        assert_eq!(got.file_size(), 41);
        assert!(back.get(0).is_none());
    }

    #[test]
    fn dir_record_round_trips() {
        let mut block = DirBlock::empty();
        block.push(DirRecord::new("vanakkam", 3).unwrap()).unwrap();
        let bytes = block.to_bytes();
        let back = DirBlock::from_bytes(&bytes, 1).unwrap();
        assert_eq!(back.entries()[0].filename, "vanakkam");
        assert_eq!(back.entries()[0].inode_no, 3);
    }

    #[test]
    fn dir_record_rejects_oversized_filename() {
        let name: String = std::iter::repeat('a').take(300).collect();
        assert!(DirRecord::new(&name, 1).is_err());
    }

    #[test]
    fn max_inodes_is_sixty_four() {
        assert_eq!(MAX_INODES, 64);
    }
}
