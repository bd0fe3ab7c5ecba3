//! The retrieve protocol.
//!
//! One writer, many readers, coordinated across processes through
//! advisory locks on the cache entries themselves. The creator of an
//! entry holds the exclusive lock while the bytes arrive and downgrades
//! to shared once the last byte is written; followers block on a shared
//! lock and therefore only ever observe fully written entries. A writer
//! that fails unlinks its entry while followers may still hold an open
//! descriptor to it: a zero link count is the signal to start over.

use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, MetadataExt};
use std::path::{Path, PathBuf};

use filetime::FileTime;

use crate::config::CacheConfig;
use crate::disk::{Disk, DiskRegistry};
use crate::error::{CacheError, CacheResult};
use crate::lock;
use crate::mime;
use crate::source::{self, HttpReader, SourceUrl};

/// Bound on protocol restarts after observing a failed writer.
const MAX_ATTEMPTS: usize = 3;

/// A live hold on a cache entry.
///
/// The pin is the open descriptor itself: it keeps a shared advisory lock
/// on the entry for its whole lifetime, which is what holds eviction
/// away. Dropping the pin closes the descriptor and releases the lock.
#[derive(Debug)]
pub(crate) struct EntryPin {
    file: File,
    path: PathBuf,
    entry_path: PathBuf,
    owns_entry: bool,
}

impl EntryPin {
    /// The local path at which the file's bytes are readable.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the entry if no other pin is live, then releases.
    ///
    /// Files resolved on a local mount live outside the cache root and are
    /// never deleted.
    pub fn discard(self) {
        if !self.owns_entry {
            return;
        }

        match lock::try_lock_exclusive(&self.file) {
            Ok(true) => {
                if let Err(e) = fs::remove_file(&self.entry_path) {
                    if e.kind() != io::ErrorKind::NotFound {
                        tracing::debug!(
                            "Failed to remove cache entry {}: {e}",
                            self.entry_path.display()
                        );
                    }
                }
            }
            // someone else still holds the entry; leave it cached
            Ok(false) => {}
            Err(e) => {
                tracing::debug!("Failed to upgrade pin on {}: {e}", self.entry_path.display())
            }
        }
    }
}

/// Produces pinned local paths for file URLs.
#[derive(Debug)]
pub(crate) struct Retriever {
    config: CacheConfig,
    disks: DiskRegistry,
    http: HttpReader,
}

impl Retriever {
    pub fn new(config: CacheConfig, disks: DiskRegistry) -> Self {
        let http = HttpReader::new(&config);
        Self {
            config,
            disks,
            http,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn disks(&self) -> &DiskRegistry {
        &self.disks
    }

    pub fn http(&self) -> &HttpReader {
        &self.http
    }

    /// Produces a pinned local path for `url`.
    ///
    /// Either shares an existing entry or becomes the entry's writer and
    /// populates it from its source.
    pub fn retrieve(&self, url: &str) -> CacheResult<EntryPin> {
        self.ensure_cache_root()?;
        let entry_path = self.config.entry_path(url);

        for _ in 0..MAX_ATTEMPTS {
            match OpenOptions::new()
                .read(true)
                .write(true)
                .create_new(true)
                .open(&entry_path)
            {
                // We made the entry, so we are its writer.
                Ok(file) => return self.populate(url, &entry_path, file),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    match self.follow(&entry_path)? {
                        Some(pin) => return Ok(pin),
                        // The writer failed mid-flight; start over.
                        None => continue,
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(CacheError::FetchFailed {
            url: url.to_owned(),
            reason: format!("fetch kept failing after {MAX_ATTEMPTS} attempts"),
        })
    }

    fn ensure_cache_root(&self) -> io::Result<()> {
        DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(&self.config.path)
    }

    /// Writer branch: fill the freshly created entry.
    fn populate(&self, url: &str, entry_path: &Path, file: File) -> CacheResult<EntryPin> {
        if let Err(e) = lock::lock_exclusive(&file) {
            let _ = fs::remove_file(entry_path);
            return Err(e.into());
        }

        match self.fill(url, entry_path, &file) {
            Ok(resolved) => {
                let owns_entry = resolved.is_none();
                let path = resolved.unwrap_or_else(|| entry_path.to_owned());

                // Only now is the entry visible to followers as complete.
                lock::lock_shared(&file)?;
                touch(&file)?;

                Ok(EntryPin {
                    file,
                    path,
                    entry_path: entry_path.to_owned(),
                    owns_entry,
                })
            }
            Err(e) => {
                tracing::debug!("Fetching `{url}` failed: {e}");
                // Dropping the link count to zero is the failure signal
                // concurrent followers look for.
                let _ = fs::remove_file(entry_path);
                Err(e)
            }
        }
    }

    /// Streams the file's bytes into the entry, or resolves the physical
    /// path for local mounts.
    ///
    /// Returns `Some(path)` when the file lives on a local mount; the
    /// placeholder entry has been unlinked by then, but its descriptor
    /// (and the lock on it) stays open with the caller.
    fn fill(&self, url: &str, entry_path: &Path, file: &File) -> CacheResult<Option<PathBuf>> {
        let limit = self.config.file_size_limit();
        let mut sink = file;

        match SourceUrl::parse(url)? {
            SourceUrl::Remote(_) => {
                self.http.download(url, &mut sink, limit)?;
            }
            SourceUrl::Disk { disk, object_path } => match self.disks.get(disk)? {
                Disk::Local(local) => {
                    let resolved = source::resolve_local(local, object_path)?;
                    fs::remove_file(entry_path)?;
                    return Ok(Some(resolved));
                }
                Disk::Object(object) => {
                    source::download_object(object.as_ref(), url, object_path, &mut sink, limit)?;
                }
            },
        }

        self.check_mime(file)?;
        Ok(None)
    }

    /// Applies the MIME allow-set to the bytes that landed in the entry.
    fn check_mime(&self, file: &File) -> CacheResult<()> {
        if self.config.mime_types.is_empty() {
            return Ok(());
        }

        let mut reader = file;
        let mime = mime::detect_mime(&mut reader)?.unwrap_or(mime::FALLBACK_MIME);
        if !self.config.mime_types.contains(mime) {
            return Err(CacheError::DisallowedMime(mime.to_owned()));
        }

        Ok(())
    }

    /// Follower branch: wait for the writer, then share the entry.
    ///
    /// Returns `None` when the entry has to be recreated, either because
    /// it vanished before we could open it or because the writer failed
    /// and unlinked it while we were blocked on the lock.
    fn follow(&self, entry_path: &Path) -> CacheResult<Option<EntryPin>> {
        let file = match File::open(entry_path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        // Blocks until the writer downgrades or gives up.
        lock::lock_shared(&file)?;

        if file.metadata()?.nlink() == 0 {
            return Ok(None);
        }

        touch(&file)?;

        Ok(Some(EntryPin {
            file,
            path: entry_path.to_owned(),
            entry_path: entry_path.to_owned(),
            owns_entry: true,
        }))
    }
}

/// Marks the entry as freshly used.
///
/// Touches are advisory: concurrent touches are idempotent, and eviction
/// re-checks the access time under its lock.
fn touch(file: &File) -> io::Result<()> {
    let now = FileTime::now();
    filetime::set_file_handle_times(file, Some(now), Some(now))
}
