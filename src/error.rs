use std::io;

use thiserror::Error;

/// An error surfaced by the cache or one of its source readers.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The URL scheme names a disk that is not present in the registry.
    #[error("no disk named `{0}` is configured")]
    UnknownDisk(String),

    /// The object does not exist on its local mount.
    #[error("not found")]
    NotFound,

    /// A source reader failed to deliver the file's bytes.
    ///
    /// The reason is the message of the deepest underlying error.
    #[error("failed to fetch `{url}`: {reason}")]
    FetchFailed { url: String, reason: String },

    /// The file is larger than the configured `max_file_size`.
    #[error("file exceeds the configured maximum size")]
    FileTooLarge,

    /// The source stream timed out.
    #[error("source read timed out")]
    Timeout,

    /// The file's MIME type is not in the configured allow-set.
    #[error("MIME type `{0}` is not allowed")]
    DisallowedMime(String),

    /// An unexpected filesystem error (lock, open, unlink).
    #[error("filesystem error")]
    Io(#[from] io::Error),
}

/// Alias for results produced by the cache.
pub type CacheResult<T = ()> = Result<T, CacheError>;

impl CacheError {
    /// Builds a [`FetchFailed`](Self::FetchFailed) from an error chain.
    ///
    /// Error chains from the HTTP client tend to bury the interesting part
    /// (connection refused, DNS failure) several levels deep, so the reason
    /// is taken from the deepest source.
    pub(crate) fn fetch_failed(url: &str, mut error: &dyn std::error::Error) -> Self {
        while let Some(source) = error.source() {
            error = source;
        }

        Self::FetchFailed {
            url: url.to_owned(),
            reason: error.to_string(),
        }
    }
}
