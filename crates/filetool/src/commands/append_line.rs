//! append-line command implementation

use anyhow::Result;
use clap::{Args, ValueEnum};
use filetool_core::{AppendEngine, LineRequest, append_line_to_path};
use std::path::PathBuf;

use super::output::{AppendReport, print_report};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LineEnding {
    /// `\n`
    #[value(name = "LF")]
    Lf,
    /// `\r\n`
    #[value(name = "CRLF")]
    Crlf,
    /// `\r`
    #[value(name = "CR")]
    Cr,
}

impl LineEnding {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            LineEnding::Lf => b"\n",
            LineEnding::Crlf => b"\r\n",
            LineEnding::Cr => b"\r",
        }
    }
}

/// Append LINES to a file with control over creation and uniqueness
#[derive(Args, Debug)]
pub struct AppendLineArgs {
    /// Lines to append, in order
    #[arg(required = true)]
    lines: Vec<String>,

    /// File to append to
    #[arg(long)]
    path: PathBuf,

    /// Only write a line if it is not already present in the file
    #[arg(long)]
    unique: bool,

    /// Line ending appended to each line, also used to split the file for --unique
    #[arg(long, value_enum, ignore_case = true, default_value = "LF")]
    line_ending: LineEnding,

    /// Ignore text after this marker when comparing lines for --unique (empty means none)
    #[arg(long)]
    comment_marker: Option<String>,

    /// Ignore leading whitespace when comparing lines for --unique
    #[arg(long)]
    ignore_leading_whitespace: bool,

    /// Ignore trailing whitespace when comparing lines for --unique
    #[arg(long)]
    ignore_trailing_whitespace: bool,

    /// Fail instead of creating the file if it does not exist
    #[arg(long)]
    do_not_create: bool,

    /// Create missing parent directories
    #[arg(long)]
    make_parents: bool,

    /// Delete the file first so it ends up holding only the written line
    #[arg(long)]
    unlink_first: bool,

    /// Show what would be written without modifying the file
    #[arg(long)]
    dry_run: bool,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

impl AppendLineArgs {
    fn request<'a>(&'a self, line: &'a str, dry_run: bool) -> LineRequest<'a> {
        LineRequest {
            line,
            path: &self.path,
            line_ending: self.line_ending.as_bytes(),
            unique: self.unique,
            comment_marker: self.comment_marker.as_deref().filter(|m| !m.is_empty()),
            ignore_leading_whitespace: self.ignore_leading_whitespace,
            ignore_trailing_whitespace: self.ignore_trailing_whitespace,
            create_if_missing: !self.do_not_create,
            make_parents: self.make_parents,
            unlink_first: self.unlink_first,
            dry_run,
        }
    }
}

/// Execute the append-line command
pub fn execute(engine: &AppendEngine, args: AppendLineArgs) -> Result<()> {
    // Validate every line before anything is written
    for line in &args.lines {
        append_line_to_path(engine, &args.request(line, true))?;
    }

    for line in &args.lines {
        let request = args.request(line, args.dry_run);
        let written = append_line_to_path(engine, &request)?;
        let report = AppendReport::new(&args.path, written, args.dry_run);
        print_report(&report, &request.payload(), args.json)?;
    }
    Ok(())
}
