//! Idempotent append engine
//!
//! [`AppendEngine::append`] writes a payload to the end of a file while
//! holding both lock layers for that path. With uniqueness enabled the file is
//! checked first and the write is skipped when the payload is already there:
//!
//! - **Line mode** ([`MatchPolicy::Line`]): the file is split on a delimiter
//!   and the payload must equal one whole (optionally comment-stripped and
//!   trimmed) segment, delimiter included.
//! - **Binary mode** ([`MatchPolicy::Binary`]): the payload may appear
//!   anywhere, including inside a longer line.
//!
//! The two modes disagree on purpose. Given `"prefix\nTARGET\nsuffix\n"`, a
//! binary-mode append of `"TARGET"` is skipped while a line-mode append of
//! `"TARGET"` is written, because the stored segment is `"TARGET\n"`.

use crate::config::LockDirConfig;
use crate::error::FiletoolError;
use crate::io::eintr;
use crate::io::lock::LockToken;
use crate::io::scan::find_bytes_offset;
use crate::io::split::{DEFAULT_SPLIT_CHUNK_SIZE, SplitOptions, split, validate_markers};
use std::fs::{self, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::debug;

/// Read size for binary-mode uniqueness scans
pub const BINARY_SCAN_CHUNK_SIZE: usize = 8192;

/// Line-mode matching parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMatch {
    pub delimiter: Vec<u8>,
    pub comment_marker: Option<Vec<u8>>,
    pub strip_leading: bool,
    pub strip_trailing: bool,
}

impl LineMatch {
    fn split_options(&self) -> SplitOptions {
        SplitOptions {
            delimiter: self.delimiter.clone(),
            comment_marker: self.comment_marker.clone(),
            strip_leading: self.strip_leading,
            strip_trailing: self.strip_trailing,
            chunk_size: DEFAULT_SPLIT_CHUNK_SIZE,
        }
    }
}

/// How an existing copy of the payload is recognised
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchPolicy {
    /// Exact match against one delimiter-terminated segment
    Line(LineMatch),
    /// Substring match anywhere in the file
    Binary,
}

/// Result of a successful [`AppendEngine::append`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The payload was appended; carries the number of bytes written
    Written(usize),
    /// Uniqueness was requested and the payload was already present
    SkippedAlreadyPresent,
}

impl WriteOutcome {
    pub fn bytes_written(&self) -> usize {
        match self {
            WriteOutcome::Written(n) => *n,
            WriteOutcome::SkippedAlreadyPresent => 0,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, WriteOutcome::SkippedAlreadyPresent)
    }
}

/// Validated append options; construct with [`AppendOptions::builder`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendOptions {
    policy: Option<MatchPolicy>,
    create_if_missing: bool,
    make_parents: bool,
    unlink_first: bool,
    blocking: bool,
}

impl Default for AppendOptions {
    /// Plain append: no uniqueness check, create the file if missing
    fn default() -> Self {
        Self {
            policy: None,
            create_if_missing: true,
            make_parents: false,
            unlink_first: false,
            blocking: true,
        }
    }
}

impl AppendOptions {
    pub fn builder() -> AppendOptionsBuilder {
        AppendOptionsBuilder::default()
    }

    /// Match policy, or `None` when uniqueness is not checked
    pub fn policy(&self) -> Option<&MatchPolicy> {
        self.policy.as_ref()
    }

    pub fn unique(&self) -> bool {
        self.policy.is_some()
    }

    pub fn create_if_missing(&self) -> bool {
        self.create_if_missing
    }

    pub fn make_parents(&self) -> bool {
        self.make_parents
    }

    pub fn unlink_first(&self) -> bool {
        self.unlink_first
    }

    pub fn blocking(&self) -> bool {
        self.blocking
    }
}

/// Builder for [`AppendOptions`]. Flag combinations are checked in
/// [`build`](AppendOptionsBuilder::build), before any I/O happens.
#[derive(Debug, Clone)]
pub struct AppendOptionsBuilder {
    unique: bool,
    create_if_missing: bool,
    make_parents: bool,
    unlink_first: bool,
    line_ending: Option<Vec<u8>>,
    comment_marker: Option<Vec<u8>>,
    ignore_leading_whitespace: bool,
    ignore_trailing_whitespace: bool,
    blocking: bool,
}

impl Default for AppendOptionsBuilder {
    fn default() -> Self {
        Self {
            unique: false,
            create_if_missing: true,
            make_parents: false,
            unlink_first: false,
            line_ending: None,
            comment_marker: None,
            ignore_leading_whitespace: false,
            ignore_trailing_whitespace: false,
            blocking: true,
        }
    }
}

impl AppendOptionsBuilder {
    /// Skip the write when the payload is already present
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub fn make_parents(mut self, make_parents: bool) -> Self {
        self.make_parents = make_parents;
        self
    }

    /// Delete the target and recreate it holding only the payload
    pub fn unlink_first(mut self, unlink_first: bool) -> Self {
        self.unlink_first = unlink_first;
        self
    }

    /// Delimiter for line-mode matching; without one, matching is binary
    pub fn line_ending(mut self, line_ending: impl AsRef<[u8]>) -> Self {
        self.line_ending = Some(line_ending.as_ref().to_vec());
        self
    }

    pub fn comment_marker(mut self, marker: impl AsRef<[u8]>) -> Self {
        self.comment_marker = Some(marker.as_ref().to_vec());
        self
    }

    pub fn ignore_leading_whitespace(mut self, ignore: bool) -> Self {
        self.ignore_leading_whitespace = ignore;
        self
    }

    pub fn ignore_trailing_whitespace(mut self, ignore: bool) -> Self {
        self.ignore_trailing_whitespace = ignore;
        self
    }

    /// Fail with `WouldBlock` instead of waiting for a held lock
    pub fn blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    pub fn build(self) -> Result<AppendOptions, FiletoolError> {
        const UNIQUE: &str = "unique_bytes=True";

        if self.unlink_first && !self.unique {
            return Err(FiletoolError::Requires {
                param: "unlink_first=True",
                requires: UNIQUE,
            });
        }
        if self.make_parents && !self.create_if_missing {
            return Err(FiletoolError::Requires {
                param: "make_parents=True",
                requires: "create_if_missing=True",
            });
        }
        if let Some(line_ending) = &self.line_ending {
            if line_ending.is_empty() {
                return Err(FiletoolError::EmptyDelimiter);
            }
            if !self.unique {
                return Err(FiletoolError::Requires {
                    param: "line_ending",
                    requires: UNIQUE,
                });
            }
        }
        if let Some(marker) = &self.comment_marker {
            if marker.is_empty() {
                return Err(FiletoolError::EmptyCommentMarker);
            }
            if !self.unique {
                return Err(FiletoolError::Requires {
                    param: "comment_marker",
                    requires: UNIQUE,
                });
            }
        }
        if self.ignore_leading_whitespace && !self.unique {
            return Err(FiletoolError::Requires {
                param: "ignore_leading_whitespace=True",
                requires: UNIQUE,
            });
        }
        if self.ignore_trailing_whitespace && !self.unique {
            return Err(FiletoolError::Requires {
                param: "ignore_trailing_whitespace=True",
                requires: UNIQUE,
            });
        }

        let policy = if !self.unique {
            None
        } else if let Some(delimiter) = self.line_ending {
            validate_markers(&delimiter, self.comment_marker.as_deref())?;
            Some(MatchPolicy::Line(LineMatch {
                delimiter,
                comment_marker: self.comment_marker,
                strip_leading: self.ignore_leading_whitespace,
                strip_trailing: self.ignore_trailing_whitespace,
            }))
        } else {
            if self.comment_marker.is_some() {
                return Err(FiletoolError::LineOptionInBinaryMode {
                    param: "comment_marker",
                });
            }
            if self.ignore_leading_whitespace {
                return Err(FiletoolError::LineOptionInBinaryMode {
                    param: "ignore_leading_whitespace",
                });
            }
            if self.ignore_trailing_whitespace {
                return Err(FiletoolError::LineOptionInBinaryMode {
                    param: "ignore_trailing_whitespace",
                });
            }
            Some(MatchPolicy::Binary)
        };

        Ok(AppendOptions {
            policy,
            create_if_missing: self.create_if_missing,
            make_parents: self.make_parents,
            unlink_first: self.unlink_first,
            blocking: self.blocking,
        })
    }
}

/// Appends payloads to files under the two-level locking protocol
#[derive(Debug, Clone)]
pub struct AppendEngine {
    config: LockDirConfig,
}

impl AppendEngine {
    /// Create an engine, making sure the lock directory exists
    pub fn new(config: LockDirConfig) -> Result<Self, FiletoolError> {
        config.ensure()?;
        Ok(Self { config })
    }

    /// Engine using the lock directory from `FILETOOL_LOCK_DIR` or the default
    pub fn from_env() -> Result<Self, FiletoolError> {
        Self::new(LockDirConfig::from_env())
    }

    pub fn config(&self) -> &LockDirConfig {
        &self.config
    }

    /// Append `payload` to `path` according to `options`.
    ///
    /// # Errors
    ///
    /// - `EmptyPayload` for an empty payload
    /// - `NotFound` if the target is missing and creation is disabled, or its
    ///   parent is missing and `make_parents` is not set
    /// - `ParentMissing` if the parent is still missing after creating it
    /// - `RaceRecreated` if another writer recreated the file during an
    ///   `unlink_first` append
    /// - `WouldBlock` for a held lock in non-blocking mode
    /// - `LockingUnsupported` if the filesystem cannot `flock`
    /// - `Io` for any other OS failure
    pub fn append(
        &self,
        payload: &[u8],
        path: &Path,
        options: &AppendOptions,
    ) -> Result<WriteOutcome, FiletoolError> {
        self.append_with(payload, path, options, create_parent)
    }

    /// `append` with the parent-creation step injected.
    fn append_with(
        &self,
        payload: &[u8],
        path: &Path,
        options: &AppendOptions,
        make_parent: fn(&Path) -> Result<(), FiletoolError>,
    ) -> Result<WriteOutcome, FiletoolError> {
        if payload.is_empty() {
            return Err(FiletoolError::EmptyPayload);
        }
        if options.unlink_first {
            return replace_file(payload, path, options.make_parents);
        }

        match self.append_locked(payload, path, options, false) {
            Err(FiletoolError::NotFound { .. }) if options.create_if_missing => {
                debug!(path = %path.display(), "target missing, creating");
            }
            other => return other,
        }

        match self.append_locked(payload, path, options, true) {
            Err(FiletoolError::NotFound { .. }) if options.make_parents => {
                debug!(path = %path.display(), "parent directory missing, creating");
            }
            other => return other,
        }

        make_parent(path)?;
        match self.append_locked(payload, path, options, true) {
            Err(FiletoolError::NotFound { path }) => Err(FiletoolError::ParentMissing { path }),
            other => other,
        }
    }

    fn append_locked(
        &self,
        payload: &[u8],
        path: &Path,
        options: &AppendOptions,
        create: bool,
    ) -> Result<WriteOutcome, FiletoolError> {
        let mut token = LockToken::acquire(&self.config, path, options.blocking, create)?;
        let file = token.target();

        if let Some(policy) = &options.policy {
            rewind(file, path)?;
            if contains_payload(file, path, payload, policy)? {
                debug!(path = %path.display(), "payload already present, skipping");
                return Ok(WriteOutcome::SkippedAlreadyPresent);
            }
        }

        file.seek(SeekFrom::End(0))
            .map_err(|e| FiletoolError::io(path, e))?;
        file.write_all(payload)
            .map_err(|e| FiletoolError::io(path, e))?;
        file.flush().map_err(|e| FiletoolError::io(path, e))?;
        file.sync()?;
        debug!(path = %path.display(), bytes = payload.len(), "payload appended");
        Ok(WriteOutcome::Written(payload.len()))
    }
}

/// Append with an engine configured from the environment.
///
/// Convenience for one-off calls; long-running callers should keep an
/// [`AppendEngine`] instead.
pub fn append_bytes_to_file(
    payload: &[u8],
    path: &Path,
    options: &AppendOptions,
) -> Result<WriteOutcome, FiletoolError> {
    AppendEngine::from_env()?.append(payload, path, options)
}

fn rewind<S: Seek>(file: &mut S, path: &Path) -> Result<(), FiletoolError> {
    file.seek(SeekFrom::Start(0))
        .map(|_| ())
        .map_err(|e| FiletoolError::io(path, e))
}

fn contains_payload<R: io::Read>(
    file: &mut R,
    path: &Path,
    payload: &[u8],
    policy: &MatchPolicy,
) -> Result<bool, FiletoolError> {
    match policy {
        MatchPolicy::Line(line) => {
            for segment in split(&mut *file, &line.split_options())? {
                if segment.map_err(|e| e.at(path))? == payload {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        MatchPolicy::Binary => Ok(find_bytes_offset(file, payload, BINARY_SCAN_CHUNK_SIZE)
            .map_err(|e| e.at(path))?
            .is_some()),
    }
}

fn create_parent(path: &Path) -> Result<(), FiletoolError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| FiletoolError::io(parent, e))
        }
        _ => Ok(()),
    }
}

/// Unlink `path` and recreate it holding exactly `payload`.
///
/// Exclusive create makes the write atomic with respect to other creators, so
/// no lock is taken. A file reappearing between unlink and create is reported
/// as `RaceRecreated` and not retried.
fn replace_file(
    payload: &[u8],
    path: &Path,
    make_parents: bool,
) -> Result<WriteOutcome, FiletoolError> {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "unlinked target"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(FiletoolError::io(path, e)),
    }
    if make_parents {
        create_parent(path)?;
    }
    write_exclusive(payload, path)
}

/// Create `path` exclusively and write `payload` to it.
///
/// An existing file is `RaceRecreated`; a missing parent is `NotFound`.
fn write_exclusive(payload: &[u8], path: &Path) -> Result<WriteOutcome, FiletoolError> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    let mut file = match eintr::open(&options, path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(FiletoolError::RaceRecreated {
                path: path.to_path_buf(),
            });
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(FiletoolError::NotFound {
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(FiletoolError::io(path, e)),
    };

    file.write_all(payload)
        .map_err(|e| FiletoolError::io(path, e))?;
    file.flush().map_err(|e| FiletoolError::io(path, e))?;
    eintr::fsync(&file).map_err(|e| FiletoolError::io(path, e))?;
    Ok(WriteOutcome::Written(payload.len()))
}
