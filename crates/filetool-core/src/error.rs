//! Error types for append, split, scan and locking operations

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Coarse classification of a [`FiletoolError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad parameter or parameter combination, detected before any I/O
    Configuration,
    /// A non-blocking lock was requested but is held elsewhere
    Contention,
    /// Another writer changed the filesystem underneath a multi-step operation
    Race,
    /// Target (or its parent directory) is missing and creation was not allowed
    NotFound,
    /// The filesystem does not support the locking primitive
    Unsupported,
    /// Any other operating system failure
    Os,
}

/// Errors that can occur while appending to, splitting or scanning a file
#[derive(Error, Debug)]
pub enum FiletoolError {
    /// The payload to append was empty
    #[error("bytes_payload must not be empty")]
    EmptyPayload,

    /// A line/segment delimiter was given but empty
    #[error("delim must not be empty")]
    EmptyDelimiter,

    /// A comment marker was given but empty
    #[error("comment_marker must not be empty")]
    EmptyCommentMarker,

    /// Comment marker identical to the delimiter would disable comment stripping
    #[error("comment_marker can not match delim")]
    CommentMarkerEqualsDelimiter,

    /// Delimiter inside the comment marker would disable comment stripping
    #[error("delim must not be contained in comment_marker")]
    DelimiterInCommentMarker,

    /// A substring search was asked to find nothing
    #[error("target bytes must not be empty")]
    EmptyScanTarget,

    /// Chunked readers need a positive chunk size
    #[error("chunk_size must be greater than zero")]
    InvalidChunkSize,

    /// An option was enabled without the option it depends on
    #[error("{param} requires {requires}")]
    Requires {
        param: &'static str,
        requires: &'static str,
    },

    /// A line-mode option was supplied while uniqueness runs in binary mode
    #[error("{param} has no effect without a line ending (binary mode)")]
    LineOptionInBinaryMode { param: &'static str },

    /// A single line contained its own line ending
    #[error(
        "Line contains the line_ending delimiter ({line_ending}). Options: \
         (1) Use separate calls for multiple lines, \
         (2) Use append_bytes_to_path for multi-line data, or \
         (3) Choose a different line_ending that doesn't appear in your data."
    )]
    LineContainsDelimiter { line_ending: String },

    /// Line text could not be used as a payload
    #[error("Line must not be empty")]
    EmptyLine,

    /// Non-blocking lock requested but the lock is held elsewhere
    #[error("Lock on {path} is held by another process")]
    WouldBlock { path: PathBuf },

    /// The file was recreated between unlink and exclusive create
    #[error("Race detected: file {path} was recreated before atomic write (unlink_first=True)")]
    RaceRecreated { path: PathBuf },

    /// Parent directory vanished again after it was created
    #[error("Parent directory of {path} is still missing after it was created")]
    ParentMissing { path: PathBuf },

    /// Target or parent directory missing and creation not allowed
    #[error("No such file or directory: {path}")]
    NotFound { path: PathBuf },

    /// flock(2) reported ENOLCK
    #[error(
        "Locking unavailable on {path} (ENOLCK). Possibly NFSv3 or misconfigured lockd \
         (or a mount using nolock): {source}"
    )]
    LockingUnsupported {
        path: PathBuf,
        source: std::io::Error,
    },

    /// File I/O error
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Read error from a caller-supplied stream with no known path
    #[error("I/O error while reading stream: {source}")]
    Stream { source: std::io::Error },
}

impl FiletoolError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        FiletoolError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Attach a path to a stream read error
    pub fn at(self, path: &Path) -> Self {
        match self {
            FiletoolError::Stream { source } => FiletoolError::io(path, source),
            other => other,
        }
    }

    /// Classify this error according to the error taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            FiletoolError::EmptyPayload
            | FiletoolError::EmptyDelimiter
            | FiletoolError::EmptyCommentMarker
            | FiletoolError::CommentMarkerEqualsDelimiter
            | FiletoolError::DelimiterInCommentMarker
            | FiletoolError::EmptyScanTarget
            | FiletoolError::InvalidChunkSize
            | FiletoolError::Requires { .. }
            | FiletoolError::LineOptionInBinaryMode { .. }
            | FiletoolError::LineContainsDelimiter { .. }
            | FiletoolError::EmptyLine => ErrorKind::Configuration,
            FiletoolError::WouldBlock { .. } => ErrorKind::Contention,
            FiletoolError::RaceRecreated { .. } | FiletoolError::ParentMissing { .. } => {
                ErrorKind::Race
            }
            FiletoolError::NotFound { .. } => ErrorKind::NotFound,
            FiletoolError::LockingUnsupported { .. } => ErrorKind::Unsupported,
            FiletoolError::Io { .. } | FiletoolError::Stream { .. } => ErrorKind::Os,
        }
    }

    /// Path the error refers to, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            FiletoolError::WouldBlock { path }
            | FiletoolError::RaceRecreated { path }
            | FiletoolError::ParentMissing { path }
            | FiletoolError::NotFound { path }
            | FiletoolError::LockingUnsupported { path, .. }
            | FiletoolError::Io { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Message phrased in terms of command-line flags rather than parameters
    pub fn cli_message(&self) -> String {
        match self {
            FiletoolError::EmptyPayload => "BYTES must not be empty".to_string(),
            FiletoolError::EmptyLine => "LINE must not be empty".to_string(),
            FiletoolError::Requires { param, requires } => {
                match (cli_flag(param), cli_flag(requires)) {
                    ("--make-parents", _) => {
                        "--make-parents requires file creation (do not use --do-not-create)"
                            .to_string()
                    }
                    (flag, required) => format!("{flag} requires {required}"),
                }
            }
            FiletoolError::LineOptionInBinaryMode { param } => {
                format!("{} requires a line ending", cli_flag(param))
            }
            FiletoolError::LineContainsDelimiter { line_ending } => format!(
                "Line contains the line_ending delimiter ({line_ending}). Options: \
                 (1) Use separate calls for multiple lines, \
                 (2) Use 'append-bytes' for multi-line data, or \
                 (3) Choose a different --line-ending that doesn't appear in your data."
            ),
            other => other.to_string(),
        }
    }
}

fn cli_flag(param: &str) -> &str {
    match param.trim_end_matches("=True") {
        "unlink_first" => "--unlink-first",
        "unique_bytes" | "unique" => "--unique",
        "make_parents" => "--make-parents",
        "create_if_missing" => "--create",
        "line_ending" => "--line-ending",
        "comment_marker" => "--comment-marker",
        "ignore_leading_whitespace" => "--ignore-leading-whitespace",
        "ignore_trailing_whitespace" => "--ignore-trailing-whitespace",
        other => other,
    }
}

/// Render bytes the way they appear in diagnostics (`b"\r\n"`)
pub fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::from("b\"");
    for &b in bytes {
        out.extend(std::ascii::escape_default(b).map(char::from));
    }
    out.push('"');
    out
}
