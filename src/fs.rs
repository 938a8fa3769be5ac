//! Filesystem operations.
//!
//! Composes the allocator, inode store, directory manager, and journal
//! under a fixed lock-acquisition order. This module is the filesystem
//! operation surface exposed to whatever external dispatcher mounts an
//! image: `mount`, `lookup`, `create`, `mkdir`, `iterate_dir`, `read`,
//! `write`, `destroy_inode`, `put_super`, `kill_sb`.

use crate::cancel::{self, CancellationToken};
use crate::device::{BlockDevice, BLOCK_SIZE};
use crate::directory;
use crate::error::{Error, Result};
use crate::inode_store::InodeStoreManager;
use crate::journal::{ExternalDeviceJournal, Journal, NullJournal};
use crate::layout::{
    FileType, InodeRecord, DIR_RECORD_SIZE, FIRST_ALLOCATABLE_INODE, MAX_INODES, ROOT_INODE_NUMBER,
};
use crate::options::{JournalLocation, MountOptions};
use crate::superblock::SuperblockManager;
use log::{debug, info};
use std::sync::{Arc, Mutex};

type SharedDevice = Arc<dyn BlockDevice>;

/// An in-memory handle to one filesystem object. Cheap to copy; always
/// reflects the state as of the last operation that returned or updated
/// it — callers that need the latest state re-`lookup` or use the handle
/// returned by the mutating call itself.
pub type Inode = InodeRecord;

/// One entry yielded by [`FlatFs::iterate_dir`].
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub inode_no: u64,
}

struct FlatFsInner {
    dev: SharedDevice,
    superblock: SuperblockManager,
    inode_store: InodeStoreManager,
    journal: Box<dyn Journal>,
    /// Serializes child insertions across every directory in the
    /// filesystem, not just one. A known scalability limitation kept
    /// deliberately simple — see `DESIGN.md`.
    dir_children_lock: Mutex<()>,
    /// Shared by every lock this filesystem holds (`SPEC_FULL.md` §5);
    /// tripping it via [`FlatFs::cancel`] fails every subsequent
    /// operation that would otherwise block on one of them.
    cancel: CancellationToken,
}

/// A mounted filesystem.
///
/// Cloning shares the same underlying state (`Arc`); every clone
/// observes the same on-disk image and locks.
#[derive(Clone)]
pub struct FlatFs {
    inner: Arc<FlatFsInner>,
}

impl FlatFs {
    /// Reads block 0, validates it, attaches the journal to the main
    /// device, and locates the root inode. Equivalent to
    /// [`FlatFs::mount_with_journal_device`] with no external journal
    /// device supplied — a `journal_dev`/`journal_path` option that
    /// resolves to a separate device fails with
    /// [`Error::JournalInitFailed`] in that case.
    pub fn mount(dev: Box<dyn BlockDevice>, options: &str) -> Result<Self> {
        Self::mount_with_journal_device(dev, options, None)
    }

    /// Like [`FlatFs::mount`], but accepts an already-opened handle for a
    /// separate journal device. Resolving `journal_dev=<devnum>` or a
    /// `journal_path=<fs-path>` block-special file to an open device is
    /// an external collaborator's concern (`SPEC_FULL.md` §1); this crate
    /// only consumes the handle once the caller has resolved it.
    ///
    /// Fails with [`Error::JournalInitFailed`] if the parsed options
    /// select a separate device (`JournalLocation::Device` or
    /// `JournalLocation::DevicePath`) but `journal_dev` is `None`.
    pub fn mount_with_journal_device(
        dev: Box<dyn BlockDevice>,
        options: &str,
        journal_dev: Option<Box<dyn BlockDevice>>,
    ) -> Result<Self> {
        let dev: SharedDevice = Arc::from(dev);
        let opts = MountOptions::parse(options);
        info!("mounting with options {opts:?}");

        let cancel = CancellationToken::new();
        let superblock = SuperblockManager::load_with_cancellation(dev.as_ref(), cancel.clone())?;
        let inode_store = InodeStoreManager::load_with_cancellation(dev.as_ref(), cancel.clone())?;

        let inodes_count = superblock.inode_count_snapshot()?;
        inode_store
            .find(ROOT_INODE_NUMBER, inodes_count)
            .map_err(|_| Error::JournalInitFailed("root inode missing from inode store"))?;

        // `SPEC_FULL.md` §6's `journal_dev`/`journal_path` options select
        // *where* the journal attaches. `Default`/`InodePath` keep it on
        // the main device; `Device`/`DevicePath` require the caller to
        // have resolved and opened that device already and handed it in.
        let journal: Box<dyn Journal> = match &opts.journal {
            JournalLocation::Default | JournalLocation::InodePath(_) => {
                Box::new(NullJournal::new(dev.clone()))
            }
            JournalLocation::Device(_) | JournalLocation::DevicePath(_) => match journal_dev {
                Some(external) => {
                    Box::new(ExternalDeviceJournal::new(dev.clone(), Arc::from(external)))
                }
                None => {
                    return Err(Error::JournalInitFailed(
                        "journal_dev/journal_path selected a separate device but none was supplied to mount",
                    ))
                }
            },
        };

        Ok(Self {
            inner: Arc::new(FlatFsInner {
                dev,
                superblock,
                inode_store,
                journal,
                dir_children_lock: Mutex::new(()),
                cancel,
            }),
        })
    }

    /// Trips this filesystem's cancellation token. Every operation that
    /// would otherwise block on the superblock, inode-store, or
    /// directory-children lock instead returns [`Error::Interrupted`]
    /// immediately, including on every other clone of this handle.
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    /// Returns a handle to the root directory inode.
    pub fn root(&self) -> Result<Inode> {
        let inodes_count = self.inner.superblock.inode_count_snapshot()?;
        self.inner.inode_store.find(ROOT_INODE_NUMBER, inodes_count)
    }

    /// Scans `parent`'s directory block for `name`.
    pub fn lookup(&self, parent: &Inode, name: &str) -> Result<Inode> {
        if !parent.is_dir() {
            return Err(Error::NotDir);
        }
        let child_no = directory::lookup(
            self.inner.dev.as_ref(),
            parent.data_block_number,
            parent.dir_children_count(),
            name,
        )?;
        let inodes_count = self.inner.superblock.inode_count_snapshot()?;
        // A stale directory entry (crash between the inode-count bump and
        // the inode-store write) surfaces as plain `NotFound`, matching
        // `SPEC_FULL.md` §4.6's defensive lookup behavior.
        self.inner.inode_store.find(child_no, inodes_count)
    }

    /// Creates a regular file named `name` under `parent`.
    pub fn create(&self, parent: &Inode, name: &str) -> Result<Inode> {
        self.create_fs_object(parent, name, FileType::Regular)
    }

    /// Creates a subdirectory named `name` under `parent`.
    pub fn mkdir(&self, parent: &Inode, name: &str) -> Result<Inode> {
        self.create_fs_object(parent, name, FileType::Directory)
    }

    fn create_fs_object(&self, parent: &Inode, name: &str, mode: FileType) -> Result<Inode> {
        if !parent.is_dir() {
            return Err(Error::NotDir);
        }
        // Lock 3, acquired first: directory-children -> inode-store-mgmt
        // -> superblock (`SPEC_FULL.md` §5).
        let _dir_guard = cancel::guarded_lock(&self.inner.dir_children_lock, &self.inner.cancel)?;

        let inodes_count = self.inner.superblock.inode_count_snapshot()?;
        if inodes_count as usize >= MAX_INODES {
            return Err(Error::NoSpace);
        }

        // Re-read the parent under the directory-children lock rather
        // than trusting the caller's possibly-stale snapshot: two
        // `create`s racing on the same parent must each see the other's
        // `dir_children_count` bump before choosing their own insertion
        // index.
        let parent = self.inner.inode_store.find(parent.inode_no, inodes_count)?;

        // "Lowest unused >= start_ino" rather than a count-derived
        // formula, per the `SPEC_FULL.md` §9 decision: defends against an
        // inode number collision on a filesystem left inconsistent by a
        // prior crash.
        let mut candidate = FIRST_ALLOCATABLE_INODE;
        while self.inner.inode_store.contains(candidate, inodes_count)? {
            candidate += 1;
        }
        let new_inode_no = candidate;

        let data_block_number = self.inner.superblock.allocate_block(self.inner.dev.as_ref())?;

        let record = InodeRecord {
            mode,
            inode_no: new_inode_no,
            data_block_number,
            payload: 0,
        };
        self.inner
            .inode_store
            .append(self.inner.dev.as_ref(), &self.inner.superblock, record)?;

        let inodes_count_after = self.inner.superblock.inode_count_snapshot()?;
        directory::append_child(
            self.inner.dev.as_ref(),
            &self.inner.inode_store,
            inodes_count_after,
            parent,
            name,
            new_inode_no,
        )?;

        debug!("created inode {new_inode_no} ({mode:?}) named {name:?} under {}", parent.inode_no);
        Ok(record)
    }

    /// Single-shot directory iteration: a nonzero `cursor` always yields
    /// end-of-stream, preserving the source's original behavior
    /// (`SPEC_FULL.md` §9).
    pub fn iterate_dir(&self, dir: &Inode, cursor: u64) -> Result<(Vec<DirEntry>, u64)> {
        if cursor != 0 {
            return Ok((Vec::new(), cursor));
        }
        if !dir.is_dir() {
            return Err(Error::NotDir);
        }
        let records = directory::read_all(
            self.inner.dev.as_ref(),
            dir.data_block_number,
            dir.dir_children_count(),
        )?;
        let next_cursor = records.len() as u64 * DIR_RECORD_SIZE as u64;
        let entries = records
            .into_iter()
            .map(|r| DirEntry {
                name: r.filename,
                inode_no: r.inode_no,
            })
            .collect();
        Ok((entries, next_cursor))
    }

    /// Copies `min(file_size - offset, buf.len())` bytes from `file`'s
    /// data block into `buf`, starting at `offset`. Returns `0` iff
    /// `offset >= file_size`.
    pub fn read(&self, file: &Inode, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if !file.is_regular() {
            return Err(Error::InvalidArg("cannot read a directory inode"));
        }
        let file_size = file.file_size();
        if offset >= file_size {
            return Ok(0);
        }
        let block = self.inner.dev.read_block(file.data_block_number)?;
        let n = std::cmp::min(file_size - offset, buf.len() as u64) as usize;
        let start = offset as usize;
        buf[..n].copy_from_slice(&block[start..start + n]);
        Ok(n)
    }

    /// Writes `data` into `file`'s data block at `offset` through a
    /// single-block journal transaction, then sets
    /// `file_size := offset + data.len()` (`SPEC_FULL.md` §9 accepts the
    /// possibility this shrinks a previously larger file). Fails with
    /// [`Error::NoSpace`] if `offset + data.len() > BLOCK_SIZE`.
    pub fn write(&self, file: &Inode, offset: u64, data: &[u8]) -> Result<usize> {
        if !file.is_regular() {
            return Err(Error::InvalidArg("cannot write a directory inode"));
        }
        if data.is_empty() {
            return Err(Error::InvalidArg("write length must be positive"));
        }
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or(Error::NoSpace)?;
        if end > BLOCK_SIZE as u64 {
            return Err(Error::NoSpace);
        }

        let handle = self.inner.journal.begin(1)?;
        let mut block = self.inner.dev.read_block(file.data_block_number)?;
        let start = offset as usize;
        block[start..start + data.len()].copy_from_slice(data);
        self.inner
            .journal
            .mark_dirty(handle, file.data_block_number, block)?;
        self.inner.journal.commit(handle, true)?;

        let inodes_count = self.inner.superblock.inode_count_snapshot()?;
        let updated = InodeRecord {
            payload: end,
            ..*file
        };
        self.inner
            .inode_store
            .update(self.inner.dev.as_ref(), inodes_count, updated)?;

        Ok(data.len())
    }

    /// Releases an in-memory inode handle back to the caller's inode
    /// cache. A plain API surface marker: [`Inode`] owns no resources
    /// beyond its copied fields, so there is nothing else to release.
    pub fn destroy_inode(&self, inode: Inode) {
        debug!("destroy_inode({})", inode.inode_no);
    }

    /// Flushes the in-memory superblock mirror to block 0 one final
    /// time.
    pub fn put_super(&self) -> Result<()> {
        self.inner.superblock.flush(self.inner.dev.as_ref())
    }

    /// Flushes the superblock and releases the root-inode handle. No
    /// operation may be issued against this [`FlatFs`] (or any of its
    /// clones) after `kill_sb` returns.
    pub fn kill_sb(self) -> Result<()> {
        self.put_super()?;
        info!("filesystem unmounted");
        Ok(())
    }
}
