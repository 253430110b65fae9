//! The NTFS analyzer module: opens `$Bitmap` through the mini-driver and
//! scans it for live clusters.

pub mod boot_sector;
pub mod mft;
pub mod volume;

use std::io::Write;

use uuid::Uuid;

use crate::blockdev::BlockDevice;
use crate::error::Result;
use crate::map::{BlockMap, Extent, Header};
use crate::registry::AnalyzerModule;
use crate::util::bits::Bits;

use volume::{NtfsVolume, BITMAP_RECORD_NUMBER};

pub struct NtfsAnalyzer;

impl AnalyzerModule for NtfsAnalyzer {
    fn name(&self) -> &'static str {
        "NTFS"
    }

    fn header_probe_len(&self) -> usize {
        boot_sector::SECTOR_LEN
    }

    fn recognize(&self, header: &[u8]) -> bool {
        boot_sector::recognize(header)
    }

    fn analyze(&self, device: &dyn BlockDevice, out: &mut dyn Write) -> Result<()> {
        let volume = NtfsVolume::open(device)?;
        let bitmap = volume.open_record(BITMAP_RECORD_NUMBER)?;
        let total_clusters = volume.boot.total_clusters();
        let spc = volume.boot.sectors_per_cluster as u64;

        let extents = scan_bitmap(&bitmap, device, total_clusters)?;
        let block_count: u64 = extents
            .iter()
            .map(|e| match e {
                Extent::Whole { length, .. } => *length,
                Extent::Fractional { .. } => 0,
            })
            .sum();

        let mut extents = extents;
        // The backup boot sector trails the volume as a fractional block.
        extents.push(Extent::Fractional {
            start: total_clusters,
            num: 1,
            denom: spc as u32,
        });

        let mut header = Header::new();
        header.push("UUID", Uuid::new_v4().simple().to_string());
        header.push("Type", "NTFS");
        header.push("BlockSize", volume.boot.cluster_size().to_string());
        header.push("BlockCount", block_count.to_string());
        header.push("BlockRange", total_clusters.to_string());

        let map = BlockMap { header, extents };
        map.write(out)
    }
}

/// Scans `$Bitmap` byte by byte, LSB-first, emitting one whole-block extent
/// per contiguous run of allocated clusters, bounded by `total_clusters`.
fn scan_bitmap(
    bitmap: &volume::NtfsFile,
    device: &dyn BlockDevice,
    total_clusters: u64,
) -> Result<Vec<Extent>> {
    let mut extents = Vec::new();
    let mut run_start: Option<u64> = None;

    let mut byte = [0u8; 1];
    let mut cluster = 0u64;
    let mut pos = 0u64;
    while cluster < total_clusters {
        let n = bitmap.read_at(device, pos, &mut byte)?;
        pos += 1;
        let byte_value = if n == 0 { 0 } else { byte[0] };

        for bit in 0..8 {
            if cluster >= total_clusters {
                break;
            }
            let live = byte_value.bit(bit);
            if live {
                run_start.get_or_insert(cluster);
            } else if let Some(start) = run_start.take() {
                extents.push(Extent::Whole { start, length: cluster - start });
            }
            cluster += 1;
        }
    }

    if let Some(start) = run_start {
        extents.push(Extent::Whole { start, length: cluster - start });
    }

    Ok(extents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockdev::MemDevice;
    use assert_eq as eq;

    #[test]
    fn bitmap_scan_finds_two_runs() {
        // bits 0..10 set, bits 500..510 set, out of a 1000-cluster bitmap.
        let mut bits = vec![0u8; 1000 / 8];
        for c in 0..10u64 {
            bits[(c / 8) as usize] |= 1 << (c % 8);
        }
        for c in 500..510u64 {
            bits[(c / 8) as usize] |= 1 << (c % 8);
        }
        let dev = MemDevice::new(vec![]);
        let file = volume::NtfsFile::test_resident(bits);

        let extents = scan_bitmap(&file, &dev, 1000).unwrap();
        eq!(extents.len(), 2);
        eq!(extents[0], Extent::Whole { start: 0, length: 10 });
        eq!(extents[1], Extent::Whole { start: 500, length: 10 });
    }
}
