//! Crash-safe, concurrency-safe, idempotent appends to files
//!
//! This crate ensures a byte sequence (or a line) is present in a file,
//! safely under concurrent writers in unrelated processes:
//!
//! - a named lock in a shared lock directory plus an advisory lock on the
//!   target serialize every check-then-write for one path
//! - missing targets are created with exclusive-create semantics
//! - every blocking syscall is retried when interrupted by a signal
//!
//! ```no_run
//! use filetool_core::{AppendEngine, AppendOptions, LockDirConfig};
//! use std::path::Path;
//!
//! let engine = AppendEngine::new(LockDirConfig::from_env())?;
//! let options = AppendOptions::builder().unique(true).line_ending("\n").build()?;
//! engine.append(b"export EDITOR=vim\n", Path::new("/tmp/profile"), &options)?;
//! # Ok::<(), filetool_core::FiletoolError>(())
//! ```

#[cfg(not(unix))]
compile_error!("filetool-core relies on flock(2) and only supports Unix targets");

pub mod append;
pub mod config;
pub mod error;
pub mod io;
pub mod logging;
pub mod wrappers;

pub use append::{
    AppendEngine, AppendOptions, AppendOptionsBuilder, LineMatch, MatchPolicy, WriteOutcome,
    append_bytes_to_file,
};
pub use config::LockDirConfig;
pub use error::{ErrorKind, FiletoolError};
pub use wrappers::{
    BytesRequest, LineRequest, append_bytes_to_path, append_line_to_path,
    ensure_line_in_config_file,
};
