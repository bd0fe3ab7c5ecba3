//! Support for fetching from non-local storage disks.

use std::io::Write;

use crate::config::CacheConfig;
use crate::disk::ObjectDisk;
use crate::error::{CacheError, CacheResult};

use super::copy_limited;

/// Streams the object at `object_path` into `sink`, under the same
/// byte-limit rule as remote downloads.
pub(crate) fn download_object(
    disk: &dyn ObjectDisk,
    url: &str,
    object_path: &str,
    sink: &mut impl Write,
    limit: Option<u64>,
) -> CacheResult {
    tracing::debug!("Fetching disk object `{object_path}`");

    let reader = disk.open(object_path)?;
    copy_limited(url, reader, sink, limit)
}

/// Existence probe against an object disk.
///
/// Applies the same MIME and size policy as the remote probe, as far as
/// the disk can answer for them.
pub(crate) fn object_exists(
    disk: &dyn ObjectDisk,
    object_path: &str,
    config: &CacheConfig,
) -> CacheResult<bool> {
    if !disk.exists(object_path)? {
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
