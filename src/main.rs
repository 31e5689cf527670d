//! reel - media source cache and incremental render driver
//!
//! reel provides:
//! - Resolution of URLs and local files into a probed, deduplicated cache
//! - Fingerprint-based staleness detection for planned render outputs
//! - Migration of a project cache into a shared library
//! - Unified output format (jsonl/json/md)

use anyhow::Result;
use clap::Parser;

mod backends;
mod cache;
mod cli;
mod core;
mod flows;
mod render;

fn main() -> Result<()> {
    #[cfg(windows)]
    {
        eprintln!("Error: Windows is not supported. Please use WSL (not guaranteed to work).");
        std::process::exit(1);
    }

    let cli = cli::Cli::parse();
    core::logging::init(cli.verbose, cli.quiet, cli.log_format);
    cli::run(cli)
}
