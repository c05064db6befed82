//! Two-level file locking
//!
//! Mutation of a target path is serialized by two locks taken in order:
//!
//! 1. A **named lock**: an exclusive `flock` on `<lock dir>/<sha256 of the
//!    canonical target path>`. It exists before the target does, so it also
//!    orders creators of a missing file.
//! 2. A **target lock**: an exclusive `flock` on the open target itself, which
//!    is what readers that only honor advisory locks will see.
//!
//! Both are released by guard drop: unlock first, then close. A failed unlock
//! or close is logged and never leaks the lock, because closing the last
//! descriptor of an open file description drops its `flock` in the kernel.

use crate::config::LockDirConfig;
use crate::error::FiletoolError;
use crate::io::eintr;
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::mem::ManuallyDrop;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::os::unix::io::{AsRawFd, IntoRawFd, RawFd};
use std::path::{Path, PathBuf};

/// Mode lock files are created with, so differently-privileged callers can
/// still open a lock file someone else created first
const LOCK_FILE_MODE: u32 = 0o666;

/// Access mode for [`open_locked`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    ReadWrite,
}

/// Unlock and close primitives used when a guard is dropped
struct ReleaseOps {
    unlock: fn(RawFd) -> io::Result<()>,
    close: fn(RawFd) -> io::Result<()>,
}

static SYSTEM_RELEASE: ReleaseOps = ReleaseOps {
    unlock: unlock_fd,
    close: close_fd,
};

fn unlock_fd(fd: RawFd) -> io::Result<()> {
    eintr::flock(fd, libc::LOCK_UN)
}

fn close_fd(fd: RawFd) -> io::Result<()> {
    // SAFETY: the descriptor was taken out of its `File` with `into_raw_fd`
    // and is closed exactly once. close(2) is not retried on EINTR: Linux
    // has already released the descriptor at that point.
    if unsafe { libc::close(fd) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

fn release(file: File, path: &Path, ops: &ReleaseOps) {
    let fd = file.into_raw_fd();
    if let Err(error) = (ops.unlock)(fd) {
        tracing::warn!(path = %path.display(), %error, "failed to unlock file");
    }
    if let Err(error) = (ops.close)(fd) {
        tracing::warn!(path = %path.display(), %error, "error during final cleanup of file");
    }
}

/// An open file holding an exclusive advisory lock.
///
/// Dropping the guard unlocks and closes the file, on every exit path
/// including unwinding.
pub struct LockedFile {
    file: ManuallyDrop<File>,
    path: PathBuf,
    ops: &'static ReleaseOps,
}

impl LockedFile {
    fn new(file: File, path: &Path) -> Self {
        Self {
            file: ManuallyDrop::new(file),
            path: path.to_path_buf(),
            ops: &SYSTEM_RELEASE,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush written data and metadata to disk
    pub fn sync(&self) -> Result<(), FiletoolError> {
        eintr::fsync(&self.file).map_err(|e| FiletoolError::io(&self.path, e))
    }

    #[cfg(test)]
    fn with_release_ops(mut self, ops: &'static ReleaseOps) -> Self {
        self.ops = ops;
        self
    }
}

impl std::fmt::Debug for LockedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockedFile")
            .field("path", &self.path)
            .field("fd", &self.file.as_raw_fd())
            .finish()
    }
}

impl Drop for LockedFile {
    fn drop(&mut self) {
        // SAFETY: `file` is taken exactly once, here, and never used again.
        let file = unsafe { ManuallyDrop::take(&mut self.file) };
        release(file, &self.path, self.ops);
    }
}

impl Read for LockedFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for LockedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for LockedFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

/// Guard for a held named lock; see [`acquire_named`]
#[derive(Debug)]
pub struct NamedLock {
    guard: LockedFile,
}

impl NamedLock {
    /// Path of the lock file (not of the target)
    pub fn lock_path(&self) -> &Path {
        self.guard.path()
    }
}

/// Both lock layers for one target, acquired in order.
///
/// Fields drop in declaration order, so the target lock is released before
/// the named lock.
#[derive(Debug)]
pub struct LockToken {
    target: LockedFile,
    named: NamedLock,
}

impl LockToken {
    /// Take the named lock for `path`, then open and lock the target.
    ///
    /// `blocking = false` applies to both layers.
    pub fn acquire(
        config: &LockDirConfig,
        path: &Path,
        blocking: bool,
        create: bool,
    ) -> Result<Self, FiletoolError> {
        let named = named_lock(config, path, blocking)?;
        let target = open_locked(path, OpenMode::ReadWrite, blocking, create)?;
        Ok(Self { target, named })
    }

    pub fn target(&mut self) -> &mut LockedFile {
        &mut self.target
    }

    pub fn lock_path(&self) -> &Path {
        self.named.lock_path()
    }
}

/// Absolute, symlink-resolved form of `path`.
///
/// Missing trailing components are kept as given, after resolving the
/// nearest existing ancestor, so a target that does not exist yet still maps
/// to the name it will have once created.
pub fn canonical_target(path: &Path) -> io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        match fs::canonicalize(existing) {
            Ok(mut resolved) => {
                for name in missing.iter().rev() {
                    resolved.push(name);
                }
                return Ok(resolved);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                match (existing.parent(), existing.file_name()) {
                    (Some(parent), Some(name)) => {
                        missing.push(name.to_os_string());
                        existing = parent;
                    }
                    _ => return Ok(absolute),
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Location of the named lock file for `target`
pub fn lockfile_path(config: &LockDirConfig, target: &Path) -> Result<PathBuf, FiletoolError> {
    let canonical = canonical_target(target).map_err(|e| FiletoolError::io(target, e))?;
    let digest = Sha256::digest(canonical.as_os_str().as_bytes());
    Ok(config.dir().join(format!("{digest:x}")))
}

fn lock_error(path: &Path, error: io::Error) -> FiletoolError {
    match error.raw_os_error() {
        Some(code) if code == libc::EWOULDBLOCK || code == libc::EAGAIN => {
            FiletoolError::WouldBlock {
                path: path.to_path_buf(),
            }
        }
        Some(libc::ENOLCK) => FiletoolError::LockingUnsupported {
            path: path.to_path_buf(),
            source: error,
        },
        _ => FiletoolError::io(path, error),
    }
}

fn lock_file(file: &File, path: &Path, blocking: bool) -> Result<(), FiletoolError> {
    let mut operation = libc::LOCK_EX;
    if !blocking {
        operation |= libc::LOCK_NB;
    }
    eintr::flock(file.as_raw_fd(), operation).map_err(|e| lock_error(path, e))
}

/// Acquire the named lock for `target`, blocking until it is granted.
///
/// The lock file is created if needed (never following a symlink at the lock
/// path) and is made world read/write. Lock files are never deleted.
pub fn acquire_named(config: &LockDirConfig, target: &Path) -> Result<NamedLock, FiletoolError> {
    named_lock(config, target, true)
}

/// Like [`acquire_named`], but fails with `WouldBlock` instead of waiting
pub fn try_acquire_named(
    config: &LockDirConfig,
    target: &Path,
) -> Result<NamedLock, FiletoolError> {
    named_lock(config, target, false)
}

fn named_lock(
    config: &LockDirConfig,
    target: &Path,
    blocking: bool,
) -> Result<NamedLock, FiletoolError> {
    let lock_path = lockfile_path(config, target)?;

    let mut options = OpenOptions::new();
    options
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .mode(LOCK_FILE_MODE)
        .custom_flags(libc::O_NOFOLLOW);
    let file = eintr::open(&options, &lock_path).map_err(|e| FiletoolError::io(&lock_path, e))?;

    // The creation mode is filtered by the umask; widen it afterwards. This
    // only succeeds for the owner, which is the process that created it.
    if let Ok(meta) = file.metadata() {
        let mode = meta.permissions().mode();
        if mode & LOCK_FILE_MODE != LOCK_FILE_MODE {
            let widened = fs::Permissions::from_mode((mode & 0o7777) | LOCK_FILE_MODE);
            if let Err(error) = file.set_permissions(widened) {
                tracing::debug!(path = %lock_path.display(), %error, "could not widen lock file mode");
            }
        }
    }

    lock_file(&file, &lock_path, blocking)?;
    tracing::debug!(path = %target.display(), lock = %lock_path.display(), "named lock acquired");
    Ok(NamedLock {
        guard: LockedFile::new(file, &lock_path),
    })
}

/// Open `path` and take an exclusive advisory lock on it.
///
/// With `create`, the file is first created with exclusive-create semantics;
/// losing that race to another creator is not an error. With `blocking =
/// false`, a lock held elsewhere fails with `WouldBlock` instead of waiting.
///
/// # Errors
///
/// - `NotFound` if the file (or its parent directory) does not exist
/// - `WouldBlock` on contention in non-blocking mode
/// - `LockingUnsupported` if the filesystem reports `ENOLCK`
/// - `Io` for anything else
pub fn open_locked(
    path: &Path,
    mode: OpenMode,
    blocking: bool,
    create: bool,
) -> Result<LockedFile, FiletoolError> {
    let not_found = |e: io::Error| {
        if e.kind() == io::ErrorKind::NotFound {
            FiletoolError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            FiletoolError::io(path, e)
        }
    };

    if create {
        let mut options = OpenOptions::new();
        options.read(true).write(true).create_new(true);
        match eintr::open(&options, path) {
            Ok(_) => tracing::debug!(path = %path.display(), "created target"),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(not_found(e)),
        }
    }

    let mut options = OpenOptions::new();
    options.read(true).write(mode == OpenMode::ReadWrite);
    let file = eintr::open(&options, path).map_err(not_found)?;

    // On failure `file` is dropped here, closing the unlocked descriptor.
    lock_file(&file, path, blocking)?;
    Ok(LockedFile::new(file, path))
}
