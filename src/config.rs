use std::collections::BTreeSet;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::key::cache_key;

/// Options intended to be user-configurable.
///
/// Defaults come from [`Default`]; hosts overlay their own values by
/// deserializing a partial document over them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory used for storing cache entries. Will be created if it does
    /// not exist. The cache owns this directory exclusively.
    pub path: PathBuf,

    /// Maximum duration since last use of an entry before it becomes
    /// eligible for age-based eviction.
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,

    /// Ceiling for the aggregate size of the cache in bytes, enforced by
    /// size-based eviction only. Writes are never quota-checked.
    pub max_size: u64,

    /// Upper bound on any single cached file in bytes. Negative disables
    /// the check.
    pub max_file_size: i64,

    /// Timeout applied to remote reads.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Permitted MIME types. Empty means no restriction.
    pub mime_types: BTreeSet<String>,

    /// When set, remote connections are forced to this address while the
    /// Host header is preserved.
    pub bind_ip: Option<IpAddr>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("cache"),
            max_age: Duration::from_secs(3600 * 24),
            max_size: 1024 * 1024 * 1024,
            max_file_size: -1,
            timeout: Duration::from_secs(30),
            mime_types: BTreeSet::new(),
            bind_ip: None,
        }
    }
}

impl CacheConfig {
    /// The on-disk location of the cache entry for `url`.
    pub(crate) fn entry_path(&self, url: &str) -> PathBuf {
        self.path.join(cache_key(url))
    }

    /// The per-file size limit, or `None` when disabled.
    pub(crate) fn file_size_limit(&self) -> Option<u64> {
        u64::try_from(self.max_file_size).ok()
    }
}
