//! The sparse copier: streams live blocks between a device and an image,
//! driven by a block map, in export/import/nuke-import modes.

pub mod progress;

use std::fs::File;
use std::io::{BufRead, Read, Seek, SeekFrom, Write};
use std::path::Path;

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::map::{Extent, ExtentReader, Header};

use progress::Progress;

pub const IMAGE_SIGNATURE: &[u8; 16] = b"BLKCLONEDATA\r\n\x04\x00";
pub const IMAGE_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Export,
    Import,
    NukeImport,
}

impl Mode {
    fn is_import(self) -> bool {
        matches!(self, Mode::Import | Mode::NukeImport)
    }
}

/// Opens `src`/`tgt` as files, runs the `force`-gated swapped-operation
/// preflight check appropriate for real block devices, and streams the copy.
///
/// For `Export`, `device` reads from `src` and `image` writes to `tgt`; for
/// `Import`/`NukeImport` the roles invert (`src` is the image, `tgt` is the
/// device), matching the CLI's `--src`/`--tgt` convention.
pub fn run_sparsecopy_files(
    mode: Mode,
    index_path: &Path,
    src_path: &Path,
    tgt_path: &Path,
    force: bool,
) -> Result<()> {
    let index_file = File::open(index_path)?;
    let mut index = std::io::BufReader::new(index_file);

    // Export's target is normally a fresh image path; everything else opens
    // an endpoint that must already exist (the device, or the image read
    // back on import).
    let mut src = File::options().read(true).write(true).open(src_path)?;
    let mut tgt = File::options()
        .read(true)
        .write(true)
        .create(mode == Mode::Export)
        .open(tgt_path)?;

    check_seekable(&mut src)?;
    check_seekable(&mut tgt)?;

    if !force {
        let (device_path, device_file) = if mode == Mode::Export {
            (src_path, &src)
        } else {
            (tgt_path, &tgt)
        };
        if !is_block_device(device_file) {
            log::warn!(
                "{} does not look like a block device; pass force to proceed anyway",
                device_path.display()
            );
            return Err(Error::Argument(format!(
                "{} is not a block device (use force to override)",
                device_path.display()
            )));
        }
    }

    match mode {
        Mode::Export => run(mode, &mut index, &mut src, &mut tgt, &mut std::io::stderr()),
        Mode::Import | Mode::NukeImport => {
            run(mode, &mut index, &mut src, &mut tgt, &mut std::io::stderr())
        }
    }
}

fn is_block_device(f: &File) -> bool {
    use std::os::unix::fs::FileTypeExt;
    f.metadata().map(|m| m.file_type().is_block_device()).unwrap_or(false)
}

fn check_seekable<S: Seek>(s: &mut S) -> Result<()> {
    let start = s.stream_position()?;
    s.seek(SeekFrom::Current(1))?;
    s.seek(SeekFrom::Start(start))?;
    Ok(())
}

/// The core copy engine, generic over any seekable stream so it can be
/// exercised with in-memory buffers in tests.
///
/// `source` is the endpoint bytes are read from and `target` is the one
/// they're written to, for whichever direction `mode` implies (export:
/// device -> image; import/nuke-import: image -> device).
pub fn run<R: BufRead, S: Read + Write + Seek, T: Read + Write + Seek>(
    mode: Mode,
    index: &mut R,
    source: &mut S,
    target: &mut T,
    progress_out: &mut dyn Write,
) -> Result<()> {
    let header = Header::read(index)?;
    let block_len: usize = header
        .require("BlockSize")?
        .parse()
        .map_err(|_| Error::Format("bad BlockSize".into()))?;
    let block_count: u64 = header
        .require("BlockCount")?
        .parse()
        .map_err(|_| Error::Format("bad BlockCount".into()))?;
    let block_range: u64 = header
        .require("BlockRange")?
        .parse()
        .map_err(|_| Error::Format("bad BlockRange".into()))?;
    let uuid_str = header.require("UUID")?;
    let uuid = Uuid::parse_str(uuid_str).map_err(|e| Error::Format(format!("bad UUID: {e}")))?;

    if mode.is_import() {
        read_and_verify_image_header(source, block_len, uuid)?;
    } else {
        write_image_header(target, block_len, uuid)?;
    }

    let mut progress = Progress::new();
    let mut logical_pos = 0u64;
    let mut physical_touched = 0u64;
    let mut buf = vec![0u8; block_len];
    let mut reader = ExtentReader::new(index);

    let mut physical_pos = 0u64;

    while let Some(extent) = reader.next_extent()? {
        let start = match extent {
            Extent::Whole { start, .. } => start,
            Extent::Fractional { start, .. } => start,
        };
        physical_pos = start;

        match mode {
            Mode::Export => {
                source.seek(SeekFrom::Start(start * block_len as u64))?;
            }
            Mode::Import => {
                target.seek(SeekFrom::Start(start * block_len as u64))?;
            }
            Mode::NukeImport => {
                let want_pos = start * block_len as u64;
                let cur_pos = target.stream_position()?;
                if want_pos < cur_pos || !(want_pos - cur_pos).is_multiple_of(block_len as u64) {
                    return Err(Error::CorruptFilesystem(
                        "nuke-import gap is not a whole number of blocks".into(),
                    ));
                }
                let gap_blocks = (want_pos - cur_pos) / block_len as u64;
                let gap_start = cur_pos / block_len as u64;
                for gap_pos in gap_start..gap_start + gap_blocks {
                    buf.iter_mut().for_each(|b| *b = 0);
                    target.write_all(&buf)?;
                    physical_touched += 1;
                    progress.maybe_report(
                        progress_out,
                        logical_pos,
                        block_count,
                        gap_pos,
                        physical_touched,
                        block_range,
                    );
                }
                assert_eq!(target.stream_position()?, want_pos);
            }
        }

        match extent {
            Extent::Whole { length, .. } => {
                for _ in 0..length {
                    source.read_exact(&mut buf)?;
                    target.write_all(&buf)?;
                    logical_pos += 1;
                    physical_touched += 1;
                    progress.maybe_report(
                        progress_out,
                        logical_pos,
                        block_count,
                        physical_pos,
                        physical_touched,
                        block_range,
                    );
                    physical_pos += 1;
                }
            }
            Extent::Fractional { num, denom, .. } => {
                let partial_len = block_len * num as usize / denom as usize;
                match mode {
                    Mode::Export => {
                        buf.iter_mut().for_each(|b| *b = 0);
                        source.read_exact(&mut buf[..partial_len])?;
                        target.write_all(&buf)?;
                    }
                    Mode::Import | Mode::NukeImport => {
                        source.read_exact(&mut buf)?;
                        target.write_all(&buf[..partial_len])?;
                    }
                }
                logical_pos += 1;
                physical_touched += 1;
                progress.maybe_report(
                    progress_out,
                    logical_pos,
                    block_count,
                    physical_pos,
                    physical_touched,
                    block_range,
                );
                physical_pos += 1;
            }
        }
    }

    progress.force_report(
        progress_out,
        logical_pos,
        block_count,
        physical_pos,
        physical_touched,
        block_range,
    );
    let _ = writeln!(progress_out);
    Ok(())
}

fn write_image_header<T: Write>(target: &mut T, block_len: usize, uuid: Uuid) -> Result<()> {
    let mut block = vec![0u8; block_len];
    block[0..16].copy_from_slice(IMAGE_SIGNATURE);
    block[16..32].copy_from_slice(uuid.as_bytes());
    block[32] = IMAGE_VERSION;
    target.write_all(&block)?;
    Ok(())
}

fn read_and_verify_image_header<S: Read>(source: &mut S, block_len: usize, uuid: Uuid) -> Result<()> {
    let mut block = vec![0u8; block_len];
    source.read_exact(&mut block)?;
    if &block[0..16] != IMAGE_SIGNATURE {
        return Err(Error::Format("bad image stream signature".into()));
    }
    if &block[16..32] != uuid.as_bytes() {
        return Err(Error::Format("image UUID does not match map UUID".into()));
    }
    Ok(())
}
