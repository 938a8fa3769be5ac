//! Mount option parsing.
//!
//! Parses a comma-separated `key=value` mount-option string into a typed
//! [`MountOptions`]. Unrecognized keys are logged and ignored, matching
//! `mount(8)`'s traditional tolerance of options meant for another layer
//! of the stack.

use log::warn;

/// Where to attach the journal for a mount, if anywhere non-default.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum JournalLocation {
    /// No explicit option given; use the inode-backed journal at inode
    /// number 2.
    #[default]
    Default,
    /// `journal_dev=<devnum>`: a separate block device.
    Device(u64),
    /// `journal_path=<fs-path>` resolving to a block special file.
    DevicePath(String),
    /// `journal_path=<fs-path>` resolving to a regular file or inode.
    InodePath(String),
}

/// Parsed mount options.
#[derive(Debug, Clone, Default)]
pub struct MountOptions {
    pub journal: JournalLocation,
}

impl MountOptions {
    /// Parses a comma-separated `key=value` option string.
    ///
    /// This never fails: an empty string yields [`MountOptions::default`],
    /// and an unrecognized key is logged at `warn` and skipped rather than
    /// rejected, since the external mount dispatcher may forward options
    /// meant for other layers.
    pub fn parse(s: &str) -> MountOptions {
        let mut opts = MountOptions::default();
        for pair in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match pair.split_once('=') {
                Some(("journal_dev", v)) => match v.parse::<u64>() {
                    Ok(devnum) => opts.journal = JournalLocation::Device(devnum),
                    Err(_) => warn!("mount option journal_dev has non-numeric value: {v}"),
                },
                Some(("journal_path", v)) => {
                    opts.journal = if looks_like_block_special(v) {
                        JournalLocation::DevicePath(v.to_string())
                    } else {
                        JournalLocation::InodePath(v.to_string())
                    };
                }
                Some((key, _)) => warn!("unrecognized mount option: {key}"),
                None => warn!("malformed mount option (expected key=value): {pair}"),
            }
        }
        opts
    }
}

/// Best-effort classification of a path as a block special file, using
/// only the path's file-type metadata — no content is read.
fn looks_like_block_special(path: &str) -> bool {
    std::fs::metadata(path)
        .map(|m| {
            use std::os::unix::fs::FileTypeExt;
            m.file_type().is_block_device()
        })
        .unwrap_or(false)
}
