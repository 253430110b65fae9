//! The FAT12/16/32 analyzer module.

pub mod boot_sector;
pub mod table;

use std::io::Write;

use uuid::Uuid;

use crate::blockdev::BlockDevice;
use crate::error::{Error, Result};
use crate::map::{BlockMap, Header};
use crate::registry::AnalyzerModule;

use boot_sector::{BiosParameterBlock, FatBits, SECTOR_LEN};
use table::FatTableScanner;

pub struct FatAnalyzer;

impl AnalyzerModule for FatAnalyzer {
    fn name(&self) -> &'static str {
        "FAT"
    }

    fn header_probe_len(&self) -> usize {
        SECTOR_LEN
    }

    fn recognize(&self, header: &[u8]) -> bool {
        boot_sector::recognize(header)
    }

    fn analyze(&self, device: &dyn BlockDevice, out: &mut dyn Write) -> Result<()> {
        let mut sector = vec![0u8; SECTOR_LEN];
        device.read_exact_at(0, &mut sector)?;
        let bpb = BiosParameterBlock::read(&sector);

        let fat_bits = bpb.classify();
        let ssa = bpb.system_area_sectors() as u64;
        let total_sectors = bpb.total_sectors();
        if total_sectors < ssa {
            return Err(Error::CorruptFilesystem(
                "System Area larger than reported volume size".into(),
            ));
        }

        let data_region_sectors = total_sectors - ssa;
        let spc = bpb.sectors_per_cluster as u64;
        let total_clusters = data_region_sectors / spc;

        let fat_offset_bytes = bpb.reserved_sectors as u64 * bpb.sector_size as u64;
        let scanner = FatTableScanner::new(device, fat_offset_bytes, spc, fat_bits);
        let mut extents = vec![crate::map::Extent::Whole { start: 0, length: ssa }];
        extents.extend(scanner.scan(ssa, total_clusters)?);

        let block_count: u64 = extents
            .iter()
            .map(|e| match e {
                crate::map::Extent::Whole { length, .. } => *length,
                crate::map::Extent::Fractional { .. } => 1,
            })
            .sum();

        let mut header = Header::new();
        header.push("UUID", Uuid::new_v4().simple().to_string());
        header.push("Type", "FAT");
        header.push(
            "FsType",
            match fat_bits {
                FatBits::Fat12 => "FAT12",
                FatBits::Fat16 => "FAT16",
                FatBits::Fat32 => "FAT32",
            },
        );
        header.push("BlockSize", bpb.sector_size.to_string());
        header.push("BlockCount", block_count.to_string());
        header.push("BlockRange", total_sectors.to_string());

        let map = BlockMap { header, extents };
        map.write(out)
    }
}
