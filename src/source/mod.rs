//! The backend adapters that produce a file's bytes (or its path) for a
//! given URL.
//!
//! Three adapters exist: HTTP(S) remotes, non-local object disks, and
//! local mounts. The first two stream bytes into a cache entry; local
//! mounts resolve to a physical path and never copy anything.

use std::io::{self, Read, Write};

mod disk;
mod http;
mod local;

pub(crate) use disk::{download_object, object_exists};
pub(crate) use http::HttpReader;
pub(crate) use local::{local_exists, resolve_local};

use crate::error::{CacheError, CacheResult};

/// A logical file reference.
///
/// Anything that can answer [`url`](Self::url) can be handed to the cache.
/// The URL is the file's identity: the cache key is derived from it and
/// from nothing else.
pub trait FileRef {
    /// The URL the file's bytes live at, of the form `<scheme>://<rest>`.
    ///
    /// The scheme is either `http`/`https` or the name of a configured
    /// storage disk.
    fn url(&self) -> &str;

    /// An optional host-side identifier, for logging only.
    fn id(&self) -> Option<&str> {
        None
    }
}

impl FileRef for str {
    fn url(&self) -> &str {
        self
    }
}

impl FileRef for String {
    fn url(&self) -> &str {
        self
    }
}

impl<T: FileRef + ?Sized> FileRef for &T {
    fn url(&self) -> &str {
        (**self).url()
    }

    fn id(&self) -> Option<&str> {
        (**self).id()
    }
}

/// A parsed file URL: either a remote HTTP(S) endpoint or an object on a
/// named disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SourceUrl<'a> {
    Remote(&'a str),
    Disk { disk: &'a str, object_path: &'a str },
}

impl<'a> SourceUrl<'a> {
    pub(crate) fn parse(url: &'a str) -> CacheResult<Self> {
        let (scheme, rest) = url.split_once("://").ok_or_else(|| CacheError::FetchFailed {
            url: url.to_owned(),
            reason: "URL has no scheme".to_owned(),
        })?;

        match scheme {
            "http" | "https" => Ok(Self::Remote(url)),
            _ => Ok(Self::Disk {
                disk: scheme,
                object_path: rest,
            }),
        }
    }
}

/// Copies `reader` into `sink`, enforcing the per-file size limit.
///
/// Reads at most one byte past the limit: a stream that reaches the limit
/// is rejected, so a file of exactly the limit's size counts as too large.
pub(crate) fn copy_limited(
    url: &str,
    reader: impl Read,
    sink: &mut impl Write,
    limit: Option<u64>,
) -> CacheResult {
    let mut reader = reader;
    let copied = match limit {
        Some(limit) => {
            let copied = io::copy(&mut reader.take(limit + 1), sink).map_err(|e| read_error(url, e))?;
            if copied >= limit {
                return Err(CacheError::FileTooLarge);
            }
            copied
        }
        None => io::copy(&mut reader, sink).map_err(|e| read_error(url, e))?,
    };

    sink.flush()?;
    tracing::trace!("Streamed {copied} bytes for `{url}`");
    Ok(())
}

/// Maps an error raised while draining a source stream.
///
/// The HTTP client surfaces its errors wrapped in `io::Error` during the
/// copy; timeouts keep their identity, everything else becomes a fetch
/// failure.
fn read_error(url: &str, error: io::Error) -> CacheError {
    if error.kind() == io::ErrorKind::TimedOut {
        return CacheError::Timeout;
    }

    if let Some(inner) = error.get_ref() {
        if let Some(req) = inner.downcast_ref::<reqwest::Error>() {
            if req.is_timeout() {
                return CacheError::Timeout;
            }
        }
        return CacheError::fetch_failed(url, inner as &dyn std::error::Error);
    }

    CacheError::FetchFailed {
        url: url.to_owned(),
        reason: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_schemes() {
        assert_eq!(
            SourceUrl::parse("https://x/a").unwrap(),
            SourceUrl::Remote("https://x/a")
        );
        assert_eq!(
            SourceUrl::parse("http://x/a").unwrap(),
            SourceUrl::Remote("http://x/a")
        );
        assert_eq!(
            SourceUrl::parse("media://sub/d").unwrap(),
            SourceUrl::Disk {
                disk: "media",
                object_path: "sub/d"
            }
        );
    }

    #[test]
    fn test_parse_rejects_schemeless_urls() {
        assert!(matches!(
            SourceUrl::parse("/var/tmp/a"),
            Err(CacheError::FetchFailed { .. })
        ));
    }

    #[test]
    fn test_copy_rejects_limit_sized_streams() {
        let mut sink = Vec::new();
        let err = copy_limited("https://x/a", &b"xxxx"[..], &mut sink, Some(4)).unwrap_err();
        assert!(matches!(err, CacheError::FileTooLarge));

        let mut sink = Vec::new();
        copy_limited("https://x/a", &b"xxx"[..], &mut sink, Some(4)).unwrap();
        assert_eq!(sink, b"xxx");
    }
}
