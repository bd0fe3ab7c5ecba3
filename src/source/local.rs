//! Resolution of objects on local-mount disks.
//!
//! Files on a local mount are referenced in place. Nothing is ever copied
//! into the cache for them, and nothing under the mount is ever deleted
//! by the cache.

use std::path::PathBuf;

use crate::config::CacheConfig;
use crate::disk::LocalDisk;
use crate::error::{CacheError, CacheResult};

/// Returns the physical path of `object_path` on the mount.
pub(crate) fn resolve_local(disk: &LocalDisk, object_path: &str) -> CacheResult<PathBuf> {
    let path = disk.resolve(object_path);
    if !path.is_file() {
        return Err(CacheError::NotFound);
    }
    Ok(path)
}

/// Existence probe against a local mount, applying the MIME and size
/// policy when configured.
pub(crate) fn local_exists(
    disk: &LocalDisk,
    object_path: &str,
    config: &CacheConfig,
) -> CacheResult<bool> {
    if !disk.exists(object_path) {
        return Ok(false);
    }

    if !config.mime_types.is_empty() {
        let mime = disk.mime_type(object_path)?.unwrap_or_default();
        if !config.mime_types.contains(&mime) {
            return Err(CacheError::DisallowedMime(mime));
        }
    }

    if let Some(limit) = config.file_size_limit() {
        let size = disk.size(object_path)?;
        if size.is_some_and(|size| size > limit) {
            return Err(CacheError::FileTooLarge);
        }
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_requires_the_file() {
        let dir = crate::testutils::tempdir();
        std::fs::write(dir.path().join("d"), b"data").unwrap();

        let disk = LocalDisk::new(dir.path());
        assert_eq!(resolve_local(&disk, "d").unwrap(), dir.path().join("d"));
        assert!(matches!(
            resolve_local(&disk, "missing"),
            Err(CacheError::NotFound)
        ));
    }
}
