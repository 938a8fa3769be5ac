//! Error taxonomy shared by every module in this crate.
//!
//! Every fallible public entry point returns [`Result<T>`], a thin alias
//! over [`std::result::Result<T, Error>`]. None of these are recovered
//! internally: an operation that fails unwinds, releases any locks it
//! took in reverse order, and returns the error to the caller.

use std::io;

/// The result type returned by every fallible operation in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The error taxonomy of the filesystem.
///
/// Variants correspond 1:1 to the error kinds a mount or filesystem
/// operation can surface; none are recovered internally.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The superblock's magic number did not match. The image is rejected
    /// at mount; no other block is touched.
    #[error("bad magic: expected {expected:#x}, found {found:#x}")]
    BadMagic {
        /// The magic number this filesystem expects.
        expected: u64,
        /// The magic number actually found in the superblock.
        found: u64,
    },

    /// The superblock's `block_size` field did not match the fixed block
    /// size this implementation uses.
    #[error("bad block size: expected {expected}, found {found}")]
    BadBlockSize {
        /// The block size this filesystem expects.
        expected: u64,
        /// The block size actually found in the superblock.
        found: u64,
    },

    /// The superblock declares a version this implementation does not
    /// understand.
    #[error("unsupported on-disk version: {0}")]
    UnsupportedVersion(u64),

    /// Underlying block I/O failed.
    #[error("block I/O error: {0}")]
    IoError(#[from] io::Error),

    /// The inode store is full, or no free data block remains.
    #[error("no space left on device")]
    NoSpace,

    /// The inode or directory entry being looked up does not exist.
    #[error("not found")]
    NotFound,

    /// A directory operation was attempted on a non-directory inode.
    #[error("not a directory")]
    NotDir,

    /// The requested mode is unsupported, or an offset/length argument is
    /// out of range.
    #[error("invalid argument: {0}")]
    InvalidArg(&'static str),

    /// The parent directory's data block cannot accept another record.
    #[error("directory is full")]
    DirFull,

    /// A mutex wait was interrupted; no side effects occurred.
    #[error("operation interrupted")]
    Interrupted,

    /// The journal could not be attached at mount time.
    #[error("journal initialization failed: {0}")]
    JournalInitFailed(&'static str),

    /// A journal transaction failed to commit.
    #[error("journal I/O error: {0}")]
    JournalIo(&'static str),
}

/// Converts a poisoned-mutex condition into the I/O error variant.
///
/// A lock holder in this crate only ever panics on an I/O failure it
/// already converted to [`Error::IoError`], so a poisoned lock is treated
/// as that same condition surfacing to the next acquirer rather than as
/// a distinct error kind.
pub(crate) fn lock_poisoned() -> Error {
    Error::IoError(io::Error::other("lock poisoned by a panicked holder"))
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        lock_poisoned()
    }
}
