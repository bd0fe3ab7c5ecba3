//! Age- and size-based eviction over the cache root.
//!
//! Eviction never blocks on a lock: candidates are probed with a
//! non-blocking exclusive acquisition, and anything pinned is simply
//! skipped. Per-entry failures are logged and swallowed; an unreadable
//! cache root turns the whole pass into a no-op.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::config::CacheConfig;
use crate::lock;

/// Runs the two-phase eviction pass.
///
/// Phase one drops entries idle for longer than `max_age`. Phase two
/// frees space down to `max_size`, least recently used first.
pub(crate) fn prune(config: &CacheConfig) {
    tracing::info!("Pruning cache at {}", config.path.display());

    let Some(entries) = scan(&config.path) else {
        return;
    };

    // Phase one: by age. Survivors feed the size budget below.
    let mut total: u64 = 0;
    for entry in &entries {
        if entry.atime.elapsed().unwrap_or_default() > config.max_age
            && delete_if_expired(&entry.path, config.max_age)
        {
            continue;
        }
        total += entry.len;
    }

    if total <= config.max_size {
        return;
    }

    // Phase two: by size, least recently used first.
    let Some(mut entries) = scan(&config.path) else {
        return;
    };
    entries.sort_by_key(|entry| entry.atime);

    for entry in entries {
        if total <= config.max_size {
            break;
        }
        if safe_delete(&entry.path) {
            total = total.saturating_sub(entry.len);
        }
    }
}

/// Deletes every entry that is not currently pinned.
pub(crate) fn clear(config: &CacheConfig) {
    tracing::info!("Clearing cache at {}", config.path.display());

    let Some(entries) = scan(&config.path) else {
        return;
    };

    for entry in entries {
        safe_delete(&entry.path);
    }
}

struct ScannedEntry {
    path: PathBuf,
    atime: SystemTime,
    len: u64,
}

/// Enumerates the cache root. The root is flat; anything that is not a
/// regular file is ignored. Returns `None` when the root cannot be read.
fn scan(root: &Path) -> Option<Vec<ScannedEntry>> {
    let dir = match fs::read_dir(root) {
        Ok(dir) => dir,
        Err(e) => {
            tracing::warn!("Cache root {} is not readable: {e}", root.display());
            return None;
        }
    };

    let mut entries = Vec::new();
    for entry in dir {
        let Ok(entry) = entry else { continue };
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }

        entries.push(ScannedEntry {
            path: entry.path(),
            atime: metadata.accessed().unwrap_or(SystemTime::UNIX_EPOCH),
            len: metadata.len(),
        });
    }

    Some(entries)
}

/// Deletes `path` unless it is pinned, re-checking the age under the
/// lock. A concurrent touch between the scan and the lock wins.
fn delete_if_expired(path: &Path, max_age: Duration) -> bool {
    safe_delete_with(path, |file| {
        let Ok(metadata) = file.metadata() else {
            return false;
        };
        let atime = metadata.accessed().unwrap_or(SystemTime::UNIX_EPOCH);
        atime.elapsed().unwrap_or_default() > max_age
    })
}

/// Deletes `path` unless some pin holds it.
pub(crate) fn safe_delete(path: &Path) -> bool {
    safe_delete_with(path, |_| true)
}

fn safe_delete_with(path: &Path, check: impl FnOnce(&File) -> bool) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };

    match lock::try_lock_exclusive(&file) {
        Ok(true) => {}
        Ok(false) => {
            tracing::trace!("Skipping pinned entry {}", path.display());
            return false;
        }
        Err(e) => {
            tracing::error!(
                error = &e as &dyn std::error::Error,
                "Failed to lock cache entry {}",
                path.display()
            );
            return false;
        }
    }

    if !check(&file) {
        return false;
    }

    match fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!("Removed {}", path.display());
            true
        }
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::error!(
                    error = &e as &dyn std::error::Error,
                    "Failed to remove cache entry {}",
                    path.display()
                );
            }
            false
        }
    }
}
