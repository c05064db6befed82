//! Lock directory configuration
//!
//! Named locks live in a shared directory, one file per target path. The
//! directory is resolved once and threaded into the engine explicitly.
//!
//! # Precedence
//!
//! 1. `FILETOOL_LOCK_DIR` environment variable (if set and non-empty)
//! 2. [`DEFAULT_LOCK_DIR`]

use crate::error::FiletoolError;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

/// Environment variable overriding the lock directory
pub const LOCK_DIR_ENV: &str = "FILETOOL_LOCK_DIR";

/// Lock directory used when no override is configured
pub const DEFAULT_LOCK_DIR: &str = "/tmp/filetool-locks";

/// Location of the shared named-lock directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockDirConfig {
    dir: PathBuf,
}

impl LockDirConfig {
    /// Use an explicit lock directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Resolve the lock directory from `FILETOOL_LOCK_DIR`, falling back to
    /// [`DEFAULT_LOCK_DIR`]
    ///
    /// The value is used verbatim; only an empty value counts as unset.
    pub fn from_env() -> Self {
        match std::env::var_os(LOCK_DIR_ENV) {
            Some(dir) if !dir.is_empty() => Self::new(dir),
            _ => Self::new(DEFAULT_LOCK_DIR),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the lock directory (owner-only permissions) if it does not exist.
    ///
    /// Idempotent: an existing directory is left untouched, including its mode.
    pub fn ensure(&self) -> Result<(), FiletoolError> {
        let mut builder = std::fs::DirBuilder::new();
        builder.recursive(true).mode(0o700);
        builder
            .create(&self.dir)
            .map_err(|e| FiletoolError::io(&self.dir, e))
    }
}

impl Default for LockDirConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
