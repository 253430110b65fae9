//! Inspects a FAT or NTFS filesystem in place and prints its block map.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

#[derive(Parser)]
#[command(about = "Analyze a filesystem and print its block map")]
struct Args {
    /// Filesystem type to assume (skips auto-detection).
    #[arg(long)]
    r#type: Option<String>,

    /// Path to the block device or filesystem image to inspect.
    #[arg(long)]
    src: PathBuf,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let device = match File::open(&args.src) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("error: could not open {}: {e}", args.src.display());
            return ExitCode::FAILURE;
        }
    };

    let mut out = BufWriter::new(io::stdout());
    match diskclone::run_analyze(&device, args.r#type.as_deref(), &mut out) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
