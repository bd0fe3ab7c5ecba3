//! The named-disk registry.
//!
//! Disks are the storage backends file URLs may point at, keyed by the
//! URL scheme. Two driver kinds exist: local mounts, whose files are
//! referenced in place and never copied into the cache, and object
//! stores, whose objects are streamed into cache entries. Registering
//! disks (and wiring up their credentials) is the host's business; the
//! cache only consumes the capabilities below.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{CacheError, CacheResult};
use crate::mime;

/// A non-local storage disk.
///
/// Implementations own transport and credentials. `mime_type` and `size`
/// may return `None` when the backing store does not track them; the
/// existence probe then skips the corresponding policy check.
pub trait ObjectDisk: Send + Sync {
    /// Opens a read stream for the object at `path`.
    fn open(&self, path: &str) -> CacheResult<Box<dyn Read + Send>>;

    /// Whether an object exists at `path`.
    fn exists(&self, path: &str) -> CacheResult<bool>;

    /// The object's MIME type, if the store tracks one.
    fn mime_type(&self, path: &str) -> CacheResult<Option<String>>;

    /// The object's size in bytes, if cheaply available.
    fn size(&self, path: &str) -> CacheResult<Option<u64>>;
}

/// A named storage disk.
#[derive(Clone)]
pub enum Disk {
    /// A directory on the local filesystem. Files are referenced in place.
    Local(LocalDisk),
    /// A non-local store. Objects are streamed into the cache.
    Object(Arc<dyn ObjectDisk>),
}

impl fmt::Debug for Disk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(disk) => f.debug_tuple("Local").field(disk).finish(),
            Self::Object(_) => f.write_str("Object(..)"),
        }
    }
}

/// A disk backed by a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalDisk {
    prefix: PathBuf,
}

impl LocalDisk {
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// The mount's path prefix.
    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// The physical path of `object_path` on this mount.
    pub fn resolve(&self, object_path: &str) -> PathBuf {
        self.prefix.join(object_path)
    }

    pub(crate) fn exists(&self, object_path: &str) -> bool {
        self.resolve(object_path).is_file()
    }

    pub(crate) fn mime_type(&self, object_path: &str) -> CacheResult<Option<String>> {
        let mut file = match File::open(self.resolve(object_path)) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(CacheError::NotFound),
            Err(e) => return Err(e.into()),
        };
        Ok(mime::detect_mime(&mut file)?.map(str::to_owned))
    }

    pub(crate) fn size(&self, object_path: &str) -> CacheResult<Option<u64>> {
        match self.resolve(object_path).metadata() {
            Ok(metadata) => Ok(Some(metadata.len())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(CacheError::NotFound),
            Err(e) => Err(e.into()),
        }
    }
}

/// Per-name records of the configured storage disks.
#[derive(Debug, Default, Clone)]
pub struct DiskRegistry {
    disks: BTreeMap<String, Disk>,
}

impl DiskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `disk` under `name`, replacing any previous record.
    pub fn insert(&mut self, name: impl Into<String>, disk: Disk) {
        self.disks.insert(name.into(), disk);
    }

    /// Looks up the disk registered under `name`.
    pub fn get(&self, name: &str) -> CacheResult<&Disk> {
        self.disks
            .get(name)
            .ok_or_else(|| CacheError::UnknownDisk(name.to_owned()))
    }
}
