//! Signal-safe syscall wrappers
//!
//! Every blocking call used while a target is being mutated goes through
//! [`retry`], so a signal delivered mid-call restarts the call instead of
//! surfacing `EINTR` to the caller.

use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::io::RawFd;
use std::path::Path;

/// Re-run `op` until it finishes with anything other than `ErrorKind::Interrupted`
pub fn retry<T, F>(mut op: F) -> io::Result<T>
where
    F: FnMut() -> io::Result<T>,
{
    loop {
        match op() {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

pub fn open(options: &OpenOptions, path: &Path) -> io::Result<File> {
    retry(|| options.open(path))
}

/// `flock(2)` with `EINTR` retried
pub fn flock(fd: RawFd, operation: libc::c_int) -> io::Result<()> {
    retry(|| {
        // SAFETY: flock only inspects the descriptor number; an invalid fd
        // yields EBADF rather than undefined behaviour.
        let rc = unsafe { libc::flock(fd, operation) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    })
}

pub fn fsync(file: &File) -> io::Result<()> {
    retry(|| file.sync_all())
}

/// Read up to `buf.len()` bytes, retrying on `Interrupted`
pub fn read<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    retry(|| reader.read(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_retry_absorbs_interrupted() {
        let calls = Cell::new(0);
        let result = retry(|| {
            calls.set(calls.get() + 1);
            if calls.get() < 4 {
                Err(io::Error::from(io::ErrorKind::Interrupted))
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn test_retry_passes_other_errors_through() {
        let calls = Cell::new(0);
        let result: io::Result<()> = retry(|| {
            calls.set(calls.get() + 1);
            Err(io::Error::from_raw_os_error(libc::EWOULDBLOCK))
        });
        assert_eq!(result.unwrap_err().raw_os_error(), Some(libc::EWOULDBLOCK));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_flock_bad_descriptor() {
        let err = flock(-1, libc::LOCK_EX).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EBADF));
    }
}
