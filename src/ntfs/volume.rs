//! A read-only NTFS mini-driver: enough to open files by MFT record number
//! and read their `$DATA` stream, which is all the analyzer needs for the
//! MFT itself and for `$Bitmap`.

use crate::blockdev::BlockDevice;
use crate::error::{Error, Result};

use super::boot_sector::{NtfsBootSector, SECTOR_LEN};
use super::mft::{self, RunHeader};

pub const BITMAP_RECORD_NUMBER: u64 = 6;

/// One resolved, absolute data run: either `base_lcn` clusters on disk, or a
/// sparse hole, covering `[start_offset, start_offset + length_bytes)` of
/// the file's byte stream.
#[derive(Debug, Clone, Copy)]
struct ResolvedRun {
    start_offset: u64,
    length_bytes: u64,
    base_lcn: Option<u64>,
}

fn resolve_runs(runs: &[RunHeader], cluster_size: u64) -> Vec<ResolvedRun> {
    let mut resolved = Vec::with_capacity(runs.len());
    let mut base_lcn: i64 = 0;
    let mut offset = 0u64;
    for run in runs {
        let this_lcn = match run.lcn_delta {
            None => None,
            Some(delta) => {
                base_lcn += delta;
                Some(base_lcn as u64)
            }
        };
        let length_bytes = run.length_clusters * cluster_size;
        resolved.push(ResolvedRun {
            start_offset: offset,
            length_bytes,
            base_lcn: this_lcn,
        });
        offset += length_bytes;
    }
    resolved
}

enum FileBody {
    Resident(Vec<u8>),
    NonResident { runs: Vec<ResolvedRun>, cluster_size: u64 },
}

pub struct NtfsFile {
    body: FileBody,
    pub size: u64,
}

impl NtfsFile {
    #[cfg(test)]
    pub(crate) fn test_resident(data: Vec<u8>) -> Self {
        Self { size: data.len() as u64, body: FileBody::Resident(data) }
    }

    /// Reads up to `buf.len()` bytes starting at byte offset `pos`. Short
    /// reads at end-of-file return fewer bytes than requested; reads that
    /// land in a sparse hole are zero-filled without touching the device.
    pub fn read_at(&self, device: &dyn BlockDevice, pos: u64, buf: &mut [u8]) -> Result<usize> {
        if pos >= self.size {
            return Ok(0);
        }
        let want = buf.len().min((self.size - pos) as usize);
        let buf = &mut buf[..want];

        match &self.body {
            FileBody::Resident(data) => {
                let n = want.min(data.len().saturating_sub(pos as usize));
                buf[..n].copy_from_slice(&data[pos as usize..pos as usize + n]);
                Ok(n)
            }
            FileBody::NonResident { runs, cluster_size } => {
                let run = runs
                    .iter()
                    .find(|r| pos >= r.start_offset && pos < r.start_offset + r.length_bytes)
                    .ok_or_else(|| Error::CorruptFilesystem("position not covered by any run".into()))?;

                let run_remaining = (run.start_offset + run.length_bytes - pos) as usize;
                let n = want.min(run_remaining);

                match run.base_lcn {
                    None => {
                        for b in &mut buf[..n] {
                            *b = 0;
                        }
                    }
                    Some(lcn) => {
                        let device_offset = lcn * cluster_size + (pos - run.start_offset);
                        device.read_exact_at(device_offset, &mut buf[..n])?;
                    }
                }
                Ok(n)
            }
        }
    }

    pub fn read_exact_at(&self, device: &dyn BlockDevice, pos: u64, buf: &mut [u8]) -> Result<()> {
        let n = self.read_at(device, pos, buf)?;
        if n != buf.len() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "short read from NTFS file",
            )));
        }
        Ok(())
    }
}

pub struct NtfsVolume<'d> {
    device: &'d dyn BlockDevice,
    pub boot: NtfsBootSector,
    mft: NtfsFile,
}

impl<'d> NtfsVolume<'d> {
    pub fn open(device: &'d dyn BlockDevice) -> Result<Self> {
        let mut sector = [0u8; SECTOR_LEN];
        device.read_exact_at(0, &mut sector)?;
        if !super::boot_sector::recognize(&sector) {
            return Err(Error::CorruptFilesystem("not an NTFS boot sector".into()));
        }
        let boot = NtfsBootSector::read(&sector);

        let record_bytes = boot.mft_record_bytes() as usize;
        let mft_offset = boot.mft_first_lcn * boot.cluster_size();

        let mut record = vec![0u8; record_bytes];
        device.read_exact_at(mft_offset, &mut record)?;
        mft::apply_usa_fixup(&mut record, boot.sector_size as usize)?;

        let attrs = mft::attrs(&record)?;
        let data = mft::find_unnamed_data(&attrs)
            .ok_or_else(|| Error::CorruptFilesystem("$MFT has no unnamed $DATA attribute".into()))?;

        let mft_file = match &data.content {
            mft::AttrContent::Resident(_) => {
                return Err(Error::CorruptFilesystem("$MFT $DATA must not be resident".into()));
            }
            mft::AttrContent::NonResident { runlist, real_size } => {
                let runs = mft::decode_runlist(runlist)?;
                NtfsFile {
                    body: FileBody::NonResident {
                        runs: resolve_runs(&runs, boot.cluster_size()),
                        cluster_size: boot.cluster_size(),
                    },
                    size: *real_size,
                }
            }
        };

        Ok(Self { device, boot, mft: mft_file })
    }

    /// Opens a file by MFT record number, returning its unnamed `$DATA`
    /// stream.
    pub fn open_record(&self, record_number: u64) -> Result<NtfsFile> {
        let record_bytes = self.boot.mft_record_bytes() as usize;
        let mut record = vec![0u8; record_bytes];
        self.mft
            .read_exact_at(self.device, record_number * record_bytes as u64, &mut record)?;
        mft::apply_usa_fixup(&mut record, self.boot.sector_size as usize)?;

        let attrs = mft::attrs(&record)?;
        let data = mft::find_unnamed_data(&attrs).ok_or_else(|| {
            Error::CorruptFilesystem(format!("record {record_number} has no unnamed $DATA attribute"))
        })?;

        Ok(match &data.content {
            mft::AttrContent::Resident(bytes) => NtfsFile {
                size: bytes.len() as u64,
                body: FileBody::Resident(bytes.to_vec()),
            },
            mft::AttrContent::NonResident { runlist, real_size } => {
                let runs = mft::decode_runlist(runlist)?;
                NtfsFile {
                    body: FileBody::NonResident {
                        runs: resolve_runs(&runs, self.boot.cluster_size()),
                        cluster_size: self.boot.cluster_size(),
                    },
                    size: *real_size,
                }
            }
        })
    }

    pub fn device(&self) -> &'d dyn BlockDevice {
        self.device
    }
}
