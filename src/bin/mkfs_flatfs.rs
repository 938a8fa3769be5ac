//! `mkfs-flatfs`: writes a fresh, empty image to a file or block device.
//!
//! Mirrors `examples/original_source/mkfs-simplefs.c`'s command surface
//! (a single positional device argument) while reporting progress and
//! failures through `log` instead of `printf`/`perror`.

use clap::Parser;
use flatfs::device::FileBlockDevice;
use flatfs::layout::TOTAL_TRACKED_BLOCKS;
use flatfs::mkfs;
use log::error;
use std::fs::OpenOptions;
use std::process::ExitCode;

/// Format a file or block device with a fresh flatfs image.
#[derive(Parser)]
#[command(name = "mkfs-flatfs")]
struct Args {
    /// Path to the target file or block device.
    device: String,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let file = match OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&args.device)
    {
        Ok(f) => f,
        Err(e) => {
            error!("cannot open {}: {e}", args.device);
            return ExitCode::FAILURE;
        }
    };

    let dev = match FileBlockDevice::new(file, TOTAL_TRACKED_BLOCKS) {
        Ok(d) => d,
        Err(e) => {
            error!("cannot size {}: {e}", args.device);
            return ExitCode::FAILURE;
        }
    };

    match mkfs::format(&dev) {
        Ok(()) => {
            println!("{}: formatted {} blocks", args.device, TOTAL_TRACKED_BLOCKS);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("format failed: {e}");
            ExitCode::FAILURE
        }
    }
}
