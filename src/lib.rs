//! # A local file cache for URL-addressed files
//!
//! This crate mediates access to files whose physical backing may be a
//! remote HTTP(S) endpoint, an object in a named storage disk, or a file
//! on a named local mount. Consumers ask to *use* a file by handing the
//! [`Cache`] a file reference and a callback; while the callback runs, a
//! local path to the file's bytes exists, is pinned against eviction, and
//! is shared with every other process working on the same cache root.
//!
//! ## How coordination works
//!
//! There is no daemon and no shared memory: the filesystem itself is the
//! coordination medium, so independent worker processes on one host
//! deduplicate their downloads without knowing of each other.
//!
//! - A cache entry is a single flat file under the cache root, named by
//!   the SHA-256 of its URL.
//! - Whoever creates the entry (an atomic create-new) becomes its writer
//!   and streams the bytes in while holding an exclusive `flock(2)` lock
//!   on it. Everyone else blocks on a shared lock and wakes up once the
//!   writer downgrades, which only happens after the last byte.
//! - A writer that fails unlinks its entry before closing it. Followers
//!   that were already blocked on the descriptor observe the zero link
//!   count and start over.
//! - A *pin* is nothing but an open descriptor holding the shared lock.
//!   Eviction probes entries with a non-blocking exclusive acquisition,
//!   so pinned entries are never deleted, and releasing a pin is just
//!   closing a file.
//!
//! Files on a local mount are the exception: they are referenced in
//! place, never copied into the cache, and never deleted by it.
//!
//! ## Eviction
//!
//! [`Cache::prune`] runs a two-phase pass: entries idle for longer than
//! [`max_age`](CacheConfig::max_age) go first, then entries are dropped
//! least-recently-used first until the cache fits
//! [`max_size`](CacheConfig::max_size). [`Cache::clear`] drops everything
//! deletable. Both skip pinned entries and swallow per-entry errors.
//!
//! ## Caveats
//!
//! Advisory lock semantics differ across filesystems, notably on NFS.
//! The cache assumes `flock` is honored; keep cache roots on a local
//! filesystem.
//!
//! ```no_run
//! use filecache::{Cache, CacheConfig, DiskRegistry};
//!
//! let config = CacheConfig {
//!     path: "/var/cache/files".into(),
//!     ..Default::default()
//! };
//! let cache = Cache::new(config, DiskRegistry::new());
//!
//! let size = cache.get("https://example.com/report.pdf", |_, path| {
//!     std::fs::metadata(path).map(|m| m.len())
//! })??;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod cache;
mod cleanup;
mod config;
mod disk;
mod error;
mod key;
mod lock;
mod mime;
mod retrieve;
mod source;

#[cfg(test)]
mod testutils;

pub use cache::Cache;
pub use config::CacheConfig;
pub use disk::{Disk, DiskRegistry, LocalDisk, ObjectDisk};
pub use error::{CacheError, CacheResult};
pub use key::cache_key;
pub use source::FileRef;
