//! Analyzes FAT/NTFS filesystems in place and streams their live blocks to
//! and from sparse disk images.

pub mod blockdev;
pub mod error;
pub mod fat;
pub mod map;
pub mod ntfs;
pub mod registry;
pub mod sparsecopy;
pub mod util;

pub use error::{Error, Result};

use std::io::Write;

use blockdev::BlockDevice;
use registry::Registry;

/// Builds the registry of analyzer modules, in auto-detect priority order.
pub fn registry() -> Registry {
    let mut registry = Registry::new();
    registry.register(Box::new(fat::FatAnalyzer));
    registry.register(Box::new(ntfs::NtfsAnalyzer));
    registry
}

/// Runs `analyze` against an already-open device, writing the block map to
/// `out`.
pub fn run_analyze(device: &dyn BlockDevice, type_name: Option<&str>, out: &mut dyn Write) -> Result<()> {
    registry().dispatch(device, type_name, out)
}
