//! Thin wrappers around `flock(2)` whole-file advisory locks.
//!
//! The locks always live on the cache entry itself, never on a sidecar
//! file, so the entry's own descriptor doubles as the pin that keeps
//! eviction away. Advisory locks are only honored by cooperating
//! processes, which is exactly the contract for the cache directory.

use std::fs::File;
use std::io;
use std::os::fd::AsRawFd;

/// Acquires a shared lock, blocking until any writer is done.
pub fn lock_shared(file: &File) -> io::Result<()> {
    flock(file, libc::LOCK_SH)
}

/// Acquires an exclusive lock, blocking until all other holders are done.
///
/// Calling [`lock_shared`] afterwards on the same descriptor downgrades
/// the lock in place.
pub fn lock_exclusive(file: &File) -> io::Result<()> {
    flock(file, libc::LOCK_EX)
}

/// Attempts to take the exclusive lock without blocking.
///
/// Returns `false` when another descriptor holds any lock on the file.
pub fn try_lock_exclusive(file: &File) -> io::Result<bool> {
    match flock(file, libc::LOCK_EX | libc::LOCK_NB) {
        Ok(()) => Ok(true),
        Err(e) if e.raw_os_error() == Some(libc::EWOULDBLOCK) => Ok(false),
        Err(e) => Err(e),
    }
}

fn flock(file: &File, operation: libc::c_int) -> io::Result<()> {
    loop {
        if unsafe { libc::flock(file.as_raw_fd(), operation) } == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}
