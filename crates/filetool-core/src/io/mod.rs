//! Low-level file I/O: signal-safe syscalls, two-level locking, and the
//! streaming readers used for uniqueness checks.

pub mod eintr;
pub mod lock;
pub mod scan;
pub mod split;

pub use lock::{LockToken, LockedFile, NamedLock, OpenMode, acquire_named, open_locked};
pub use scan::find_bytes_offset;
pub use split::{SplitOptions, split, split_bytes};
