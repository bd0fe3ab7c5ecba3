//! The cache facade.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use filetime::FileTime;

use crate::cleanup;
use crate::config::CacheConfig;
use crate::disk::{Disk, DiskRegistry};
use crate::error::CacheResult;
use crate::retrieve::{EntryPin, Retriever};
use crate::source::{self, FileRef, SourceUrl};

/// A local file cache for URL-addressed files.
///
/// Construct one per cache root with an explicit [`CacheConfig`] and
/// [`DiskRegistry`] and share it freely; all methods take `&self`, and any
/// number of threads or processes may work on the same cache root
/// concurrently.
#[derive(Debug)]
pub struct Cache {
    retriever: Retriever,
}

impl Cache {
    /// Creates a cache with the given configuration and disk registry.
    pub fn new(config: CacheConfig, disks: DiskRegistry) -> Self {
        Self {
            retriever: Retriever::new(config, disks),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        self.retriever.config()
    }

    /// Pins `file` locally and runs `cb` on the resolved path.
    ///
    /// While `cb` runs the path exists, is fully written, and cannot be
    /// evicted. The pin is released on every exit path, including panics.
    /// Returns `cb`'s value.
    pub fn get<F, R>(&self, file: &F, cb: impl FnOnce(&F, &Path) -> R) -> CacheResult<R>
    where
        F: FileRef + ?Sized,
    {
        let pin = self.retriever.retrieve(file.url())?;
        let result = cb(file, pin.path());
        drop(pin);
        Ok(result)
    }

    /// Like [`get`](Self::get), but deletes the entry on release.
    ///
    /// Deletion is best-effort: it only happens when no other pin is live
    /// at release time, and never for files on a local mount.
    pub fn get_once<F, R>(&self, file: &F, cb: impl FnOnce(&F, &Path) -> R) -> CacheResult<R>
    where
        F: FileRef + ?Sized,
    {
        let mut pins = PinStack::discarding();
        pins.push(self.retriever.retrieve(file.url())?);

        let path = pins.paths().remove(0);
        let result = cb(file, &path);
        drop(pins);
        Ok(result)
    }

    /// Pins every file in order, then runs `cb` with the resolved paths.
    ///
    /// If any retrieval fails, the pins acquired so far are released in
    /// reverse order and the error surfaces before `cb` runs.
    pub fn batch<F, R>(&self, files: &[F], cb: impl FnOnce(&[F], &[PathBuf]) -> R) -> CacheResult<R>
    where
        F: FileRef,
    {
        self.batch_impl(files, cb, false)
    }

    /// [`batch`](Self::batch) with per-file delete-on-release semantics.
    pub fn batch_once<F, R>(
        &self,
        files: &[F],
        cb: impl FnOnce(&[F], &[PathBuf]) -> R,
    ) -> CacheResult<R>
    where
        F: FileRef,
    {
        self.batch_impl(files, cb, true)
    }

    fn batch_impl<F, R>(
        &self,
        files: &[F],
        cb: impl FnOnce(&[F], &[PathBuf]) -> R,
        discard: bool,
    ) -> CacheResult<R>
    where
        F: FileRef,
    {
        let mut pins = if discard {
            PinStack::discarding()
        } else {
            PinStack::default()
        };

        for file in files {
            pins.push(self.retriever.retrieve(file.url())?);
        }

        let paths = pins.paths();
        let result = cb(files, &paths);
        drop(pins);
        Ok(result)
    }

    /// Returns a read stream for `file` without pinning anything.
    ///
    /// An existing cache entry is touched and streamed from disk on a
    /// best-effort basis. Anything else streams straight from its source
    /// and never populates the cache, so concurrent calls for the same
    /// uncached remote URL each issue their own read.
    pub fn get_stream<F>(&self, file: &F) -> CacheResult<Box<dyn Read + Send>>
    where
        F: FileRef + ?Sized,
    {
        let url = file.url();

        let entry_path = self.config().entry_path(url);
        match File::open(&entry_path) {
            Ok(entry) => {
                let now = FileTime::now();
                let _ = filetime::set_file_handle_times(&entry, Some(now), Some(now));
                return Ok(Box::new(entry));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        match SourceUrl::parse(url)? {
            SourceUrl::Remote(_) => self.retriever.http().open_stream(url),
            SourceUrl::Disk { disk, object_path } => match self.retriever.disks().get(disk)? {
                Disk::Local(local) => {
                    let path = source::resolve_local(local, object_path)?;
                    Ok(Box::new(File::open(path)?))
                }
                Disk::Object(object) => object.open(object_path),
            },
        }
    }

    /// Probes whether `file` exists at its source.
    ///
    /// May fail with policy errors when a MIME allow-set or file size
    /// limit is configured.
    pub fn exists<F>(&self, file: &F) -> CacheResult<bool>
    where
        F: FileRef + ?Sized,
    {
        let url = file.url();
        let config = self.config();

        match SourceUrl::parse(url)? {
            SourceUrl::Remote(_) => self.retriever.http().exists(url, config),
            SourceUrl::Disk { disk, object_path } => match self.retriever.disks().get(disk)? {
                Disk::Local(local) => source::local_exists(local, object_path, config),
                Disk::Object(object) => source::object_exists(object.as_ref(), object_path, config),
            },
        }
    }

    /// Runs the eviction pass: drops entries idle for longer than
    /// `max_age`, then frees space down to `max_size`, least recently
    /// used first. Pinned entries are never deleted.
    pub fn prune(&self) {
        cleanup::prune(self.config());
    }

    /// Deletes every entry that is not currently pinned.
    pub fn clear(&self) {
        cleanup::clear(self.config());
    }
}

/// Pins acquired by a batch; released in reverse acquisition order on
/// every exit path, optionally discarding the entries.
#[derive(Debug, Default)]
struct PinStack {
    pins: Vec<EntryPin>,
    discard: bool,
}

impl PinStack {
    fn discarding() -> Self {
        Self {
            pins: Vec::new(),
            discard: true,
        }
    }

    fn push(&mut self, pin: EntryPin) {
        self.pins.push(pin);
    }

    fn paths(&self) -> Vec<PathBuf> {
        self.pins.iter().map(|pin| pin.path().to_owned()).collect()
    }
}

impl Drop for PinStack {
    fn drop(&mut self) {
        while let Some(pin) = self.pins.pop() {
            if self.discard {
                pin.discard();
            }
        }
    }
}
