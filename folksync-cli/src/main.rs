//! folksync — replicate identities from one source into many sinks.
//!
//! # Usage
//!
//! ```text
//! folksync sync <config> [--dry-run] [--interactive] [--only KEY]... [--log-file PATH] [--json]
//! folksync diff <config> [--only KEY]... [--log-file PATH]
//! ```
//!
//! `RUST_LOG` controls log verbosity (default `info`); `FOLKSYNC_MODE`
//! overrides the configured replication mode.

mod commands;
mod logging;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{diff::DiffArgs, sync::SyncArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "folksync",
    version,
    about = "Replicate accounts and groups from a source directory into sinks",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replicate the source into every configured sink.
    Sync(SyncArgs),

    /// Show every pending change without applying anything.
    Diff(DiffArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Sync(args) => args.run(),
        Commands::Diff(args) => args.run(),
    }
}
