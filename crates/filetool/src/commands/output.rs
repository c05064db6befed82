//! Per-payload result reporting shared by the append commands

use anyhow::Result;
use filetool_core::error::escape_bytes;
use serde::Serialize;
use std::path::Path;

/// Result of one payload, as printed by `--json`
#[derive(Debug, Serialize)]
pub struct AppendReport<'a> {
    pub path: &'a Path,
    pub bytes_written: usize,
    pub skipped: bool,
    pub dry_run: bool,
}

impl<'a> AppendReport<'a> {
    pub fn new(path: &'a Path, bytes_written: usize, dry_run: bool) -> Self {
        Self {
            path,
            bytes_written,
            skipped: bytes_written == 0,
            dry_run,
        }
    }
}

/// Print one report line, human-readable or JSON
pub fn print_report(report: &AppendReport<'_>, payload: &[u8], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
        return Ok(());
    }

    let path = report.path.display();
    if report.dry_run {
        println!("[dry-run] Would write: {} to {path}", escape_bytes(payload));
    } else if report.skipped {
        println!("Already present in {path}");
    } else {
        println!("Wrote {} bytes to {path}", report.bytes_written);
    }
    Ok(())
}
