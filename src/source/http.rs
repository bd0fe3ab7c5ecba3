//! Support for fetching from remote HTTP(S) sources.

use std::io::{Read, Write};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header;
use url::Url;

use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};

use super::copy_limited;

/// HTTP User-Agent string to use.
const USER_AGENT: &str = concat!("filecache/", env!("CARGO_PKG_VERSION"));

/// Fetches remote files over HTTP(S).
///
/// Plain GET with the default redirect policy; no custom authentication.
#[derive(Debug)]
pub(crate) struct HttpReader {
    client: Client,
    bind_ip: Option<IpAddr>,
    timeout: Duration,
}

impl HttpReader {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            client: build_client(config.timeout, None),
            bind_ip: config.bind_ip,
            timeout: config.timeout,
        }
    }

    /// Streams `url` into `sink`.
    ///
    /// Spaces in the URL are percent-encoded; every other character is
    /// passed through untouched.
    pub fn download(&self, raw_url: &str, sink: &mut impl Write, limit: Option<u64>) -> CacheResult {
        let url = parse_url(raw_url)?;
        tracing::debug!("Fetching file from `{url}`");

        let response = self
            .client_for(&url)
            .get(url)
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|e| http_error(raw_url, e))?;

        copy_limited(raw_url, response, sink, limit)
    }

    /// Existence probe via `HEAD`.
    ///
    /// A 2xx status means the file exists. When a MIME allow-set is
    /// configured the advertised `Content-Type` must be in it, and when a
    /// file size limit is configured the advertised `Content-Length` must
    /// not exceed it.
    pub fn exists(&self, raw_url: &str, config: &CacheConfig) -> CacheResult<bool> {
        let url = parse_url(raw_url)?;

        let response = self
            .client_for(&url)
            .head(url)
            .send()
            .map_err(|e| http_error(raw_url, e))?;

        if !response.status().is_success() {
            return Ok(false);
        }

        if !config.mime_types.is_empty() {
            let mime = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(|value| value.split(';').next().unwrap_or(value).trim().to_owned())
                .unwrap_or_default();

            if !config.mime_types.contains(&mime) {
                return Err(CacheError::DisallowedMime(mime));
            }
        }

        if let Some(limit) = config.file_size_limit() {
            let length = response
                .headers()
                .get(header::CONTENT_LENGTH)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok());

            if length.is_some_and(|length| length > limit) {
                return Err(CacheError::FileTooLarge);
            }
        }

        Ok(true)
    }

    /// Opens a read stream directly on the URL, bypassing the cache.
    pub fn open_stream(&self, raw_url: &str) -> CacheResult<Box<dyn Read + Send>> {
        let url = parse_url(raw_url)?;

        let response = self
            .client_for(&url)
            .get(url)
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|e| http_error(raw_url, e))?;

        Ok(Box::new(response))
    }

    /// The client to use for `url`.
    ///
    /// With a bind-IP override in effect, connections to the URL's
    /// `host:port` are forced to that address while the Host header is
    /// preserved. The port falls back to 443 for `https` and 80 otherwise.
    fn client_for(&self, url: &Url) -> Client {
        match (self.bind_ip, url.host_str()) {
            (Some(ip), Some(host)) => {
                let port = url.port_or_known_default().unwrap_or(80);
                build_client(self.timeout, Some((host, SocketAddr::new(ip, port))))
            }
            _ => self.client.clone(),
        }
    }
}

fn build_client(timeout: Duration, resolve: Option<(&str, SocketAddr)>) -> Client {
    let mut builder = Client::builder()
        .gzip(true)
        .timeout(timeout)
        .user_agent(USER_AGENT);

    if let Some((host, addr)) = resolve {
        builder = builder.resolve(host, addr);
    }

    builder.build().unwrap()
}

fn parse_url(raw_url: &str) -> CacheResult<Url> {
    Url::parse(&sanitize_url(raw_url)).map_err(|e| CacheError::FetchFailed {
        url: raw_url.to_owned(),
        reason: e.to_string(),
    })
}

/// Percent-encodes spaces; no other character is altered.
fn sanitize_url(url: &str) -> String {
    url.replace(' ', "%20")
}

fn http_error(url: &str, error: reqwest::Error) -> CacheError {
    if error.is_timeout() {
        return CacheError::Timeout;
    }

    if let Some(status) = error.status() {
        return CacheError::FetchFailed {
            url: url.to_owned(),
            reason: format!("HTTP status {status}"),
        };
    }

    CacheError::fetch_failed(url, &error)
}
