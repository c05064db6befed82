//! CLI command dispatch and execution

use anyhow::Result;
use clap::{Parser, Subcommand};
use filetool_core::{AppendEngine, LockDirConfig};
use std::path::PathBuf;

mod append_bytes;
mod append_line;
mod output;

/// filetool - idempotent, lock-protected appends
#[derive(Parser, Debug)]
#[command(
    name = "filetool",
    version,
    about = "Append lines or bytes to files safely under concurrent writers",
    long_about = "Append lines or bytes to files. Writers on the same path are serialized \
                  with a named lock plus an advisory lock, and --unique skips payloads \
                  that are already present."
)]
pub struct Cli {
    /// Directory holding named lock files (default: FILETOOL_LOCK_DIR or /tmp/filetool-locks)
    #[arg(long, global = true)]
    lock_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Append LINES to a file, each followed by the line ending
    AppendLine(append_line::AppendLineArgs),

    /// Append BYTES (or the contents of a file) to a file
    AppendBytes(append_bytes::AppendBytesArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        let config = match self.lock_dir {
            Some(dir) => LockDirConfig::new(dir),
            None => LockDirConfig::from_env(),
        };
        let engine = AppendEngine::new(config)?;

        match self.command {
            Commands::AppendLine(args) => append_line::execute(&engine, args),
            Commands::AppendBytes(args) => append_bytes::execute(&engine, args),
        }
    }
}
