//! Streams live blocks between a device and a sparse disk image, per a
//! block map produced by `analyze`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use diskclone::sparsecopy::{run_sparsecopy_files, Mode};

#[derive(Parser)]
#[command(about = "Copy live blocks between a device and a sparse disk image")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Copy live blocks from a device into an image.
    Export(CopyArgs),
    /// Restore live blocks from an image back onto a device.
    Import(CopyArgs),
}

#[derive(clap::Args)]
struct CopyArgs {
    /// Path to the block map produced by `analyze`.
    #[arg(long)]
    idx: PathBuf,

    /// Source of the copy (a device for export, an image for import).
    #[arg(long)]
    src: PathBuf,

    /// Target of the copy (an image for export, a device for import).
    #[arg(long)]
    tgt: PathBuf,

    /// On import, zero-fill any gaps between extents instead of leaving
    /// them untouched.
    #[arg(long)]
    nuke: bool,

    /// Proceed even if source/target don't look like the expected kind of
    /// endpoint (a block device on the device side).
    #[arg(long)]
    force: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let (mode, copy_args) = match &args.command {
        Command::Export(a) => (Mode::Export, a),
        Command::Import(a) if a.nuke => (Mode::NukeImport, a),
        Command::Import(a) => (Mode::Import, a),
    };

    match run_sparsecopy_files(mode, &copy_args.idx, &copy_args.src, &copy_args.tgt, copy_args.force) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
