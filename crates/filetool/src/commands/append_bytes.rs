//! append-bytes command implementation

use anyhow::{Context, Result};
use clap::Args;
use filetool_core::{AppendEngine, BytesRequest, append_bytes_to_path};
use std::path::PathBuf;

use super::output::{AppendReport, print_report};

/// Append BYTES to a file with control over creation and uniqueness
#[derive(Args, Debug)]
pub struct AppendBytesArgs {
    /// Byte strings to append, in order (UTF-8, or hex with --hex-input)
    #[arg(required_unless_present = "bytes_from_path", conflicts_with = "bytes_from_path")]
    bytes: Vec<String>,

    /// Append the contents of this file instead of BYTES
    #[arg(long)]
    bytes_from_path: Option<PathBuf>,

    /// File to append to
    #[arg(long)]
    path: PathBuf,

    /// Only write BYTES if they already appear nowhere in the file
    #[arg(long)]
    unique: bool,

    /// Interpret BYTES as hex (e.g. 68690a is "hi\n")
    #[arg(long)]
    hex_input: bool,

    /// Fail instead of creating the file if it does not exist
    #[arg(long)]
    do_not_create: bool,

    /// Create missing parent directories
    #[arg(long)]
    make_parents: bool,

    /// Delete the file first so it ends up holding only the written bytes
    #[arg(long)]
    unlink_first: bool,

    /// Show what would be written without modifying the file
    #[arg(long)]
    dry_run: bool,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

impl AppendBytesArgs {
    fn payloads(&self) -> Result<Vec<Vec<u8>>> {
        if let Some(source) = &self.bytes_from_path {
            let data = std::fs::read(source)
                .with_context(|| format!("Failed to read {}", source.display()))?;
            return Ok(vec![data]);
        }
        self.bytes
            .iter()
            .map(|raw| {
                if self.hex_input {
                    hex::decode(raw).with_context(|| format!("Invalid hex input '{raw}'"))
                } else {
                    Ok(raw.as_bytes().to_vec())
                }
            })
            .collect()
    }

    fn request<'a>(&'a self, data: &'a [u8], dry_run: bool) -> BytesRequest<'a> {
        BytesRequest {
            data,
            path: &self.path,
            unique: self.unique,
            create_if_missing: !self.do_not_create,
            make_parents: self.make_parents,
            unlink_first: self.unlink_first,
            dry_run,
        }
    }
}

/// Execute the append-bytes command
pub fn execute(engine: &AppendEngine, args: AppendBytesArgs) -> Result<()> {
    let payloads = args.payloads()?;

    // Validate every payload before anything is written
    for data in &payloads {
        append_bytes_to_path(engine, &args.request(data, true))?;
    }

    for data in &payloads {
        let written = append_bytes_to_path(engine, &args.request(data, args.dry_run))?;
        let report = AppendReport::new(&args.path, written, args.dry_run);
        print_report(&report, data, args.json)?;
    }
    Ok(())
}
