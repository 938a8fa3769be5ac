//! A small block-device-backed hierarchical filesystem.
//!
//! `flatfs` is a flat on-disk layout — a fixed superblock, a packed
//! inode store, and directly addressed data blocks — together with the
//! in-memory logic that turns `lookup`/`create`/`mkdir`/`iterate_dir`/
//! `read`/`write` into block I/O with crash-consistent ordering and
//! concurrency-safe metadata updates.
//!
//! ## Modules
//! - [`device`]: the `BlockDevice` trait and its two adapters.
//! - [`cancel`]: the cooperative cancellation token the three named locks
//!   of §5 check before every blocking acquisition.
//! - [`layout`]: on-disk byte layout and codecs for the superblock,
//!   inode store, and directory records.
//! - [`superblock`]: the free-block bitmap and inode-count allocator.
//! - [`inode_store`]: the packed inode table manager.
//! - [`directory`]: per-directory lookup and child insertion.
//! - [`journal`]: the journal interface this crate consumes, plus two
//!   reference adapters.
//! - [`options`]: mount-option parsing.
//! - [`fs`]: the filesystem operation surface — [`fs::FlatFs`].
//! - [`mkfs`]: the zero-state image formatter.
//! - [`error`]: the error taxonomy shared by every module above.
//!
//! ## Getting started
//! ```no_run
//! use flatfs::{device::{BlockDevice, MemBlockDevice}, fs::FlatFs, mkfs};
//!
//! let dev = MemBlockDevice::new(64);
//! mkfs::format(&dev).unwrap();
//! let fs = FlatFs::mount(Box::new(dev), "").unwrap();
//! let root = fs.root().unwrap();
//! let (entries, _) = fs.iterate_dir(&root, 0).unwrap();
//! assert_eq!(entries[0].name, "vanakkam");
//! ```

pub mod cancel;
pub mod device;
pub mod directory;
pub mod error;
pub mod fs;
pub mod inode_store;
pub mod journal;
pub mod layout;
pub mod mkfs;
pub mod options;
pub mod superblock;

pub use error::{Error, Result};
pub use fs::FlatFs;
