//! Helpers for tests: a local HTTP server with hit counting, an in-memory
//! object disk, and logging setup.
//!
//! When using [`Server`], make sure the instance is held until all
//! requests have been made; dropping it shuts the server down. The same
//! goes for [`tempdir`] handles and the directories they guard.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract;
use axum::http::{header, StatusCode};
use axum::middleware;
use axum::routing::get;
use axum::Router;

pub use tempfile::TempDir;

use crate::disk::{Disk, DiskRegistry, ObjectDisk};
use crate::error::{CacheError, CacheResult};

/// A minimal PNG file: signature plus the start of an IHDR chunk.
pub const PNG_BYTES: &[u8] = b"\x89PNG\x0d\x0a\x1a\x0a\x00\x00\x00\x0dIHDR";

/// Sets up the test environment.
///
/// Initializes a logger that captures all console output for the test
/// runner and mutes everything outside this crate.
pub fn setup() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("filecache=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init();
}

/// Creates a temporary directory.
///
/// The directory is deleted when the [`TempDir`] instance is dropped. Use
/// it as a guard to automatically clean up after tests.
pub fn tempdir() -> TempDir {
    TempDir::new().unwrap()
}

/// A disk registry with an in-memory object disk mounted as `mem://`,
/// holding a couple of well-known objects.
pub fn registry() -> DiskRegistry {
    let mut disk = MemoryDisk::new();
    disk.insert("greeting", b"hello from memory".to_vec(), "text/plain");
    disk.insert("tiny-png", PNG_BYTES.to_vec(), "image/png");

    let mut registry = DiskRegistry::new();
    registry.insert("mem", Disk::Object(Arc::new(disk)));
    registry
}

/// An object disk backed by a map, for tests.
#[derive(Debug, Default)]
pub struct MemoryDisk {
    objects: BTreeMap<String, (Vec<u8>, &'static str)>,
}

impl MemoryDisk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, bytes: Vec<u8>, mime: &'static str) {
        self.objects.insert(path.into(), (bytes, mime));
    }
}

impl ObjectDisk for MemoryDisk {
    fn open(&self, path: &str) -> CacheResult<Box<dyn Read + Send>> {
        let (bytes, _) = self.objects.get(path).ok_or(CacheError::NotFound)?;
        Ok(Box::new(Cursor::new(bytes.clone())))
    }

    fn exists(&self, path: &str) -> CacheResult<bool> {
        Ok(self.objects.contains_key(path))
    }

    fn mime_type(&self, path: &str) -> CacheResult<Option<String>> {
        Ok(self.objects.get(path).map(|(_, mime)| (*mime).to_owned()))
    }

    fn size(&self, path: &str) -> CacheResult<Option<u64>> {
        Ok(self.objects.get(path).map(|(bytes, _)| bytes.len() as u64))
    }
}

/// A test server bound to a random port, counting every request.
///
/// Routes:
///
/// - `/garbage_data/{data}` responds with `data`.
/// - `/blob/{len}` responds with `len` bytes of `x`.
/// - `/png` responds with a minimal PNG.
/// - `/redirect/{path}` redirects to `/{path}`.
/// - `/delay/{millis}/{path}` sleeps, then redirects to `/{path}`.
/// - `/respond_statuscode/{num}` responds with the given status code.
///
/// The server runs on its own thread with a dedicated runtime, so it can
/// serve the blocking client from ordinary tests. It stops serving when
/// dropped.
#[derive(Debug)]
pub struct Server {
    socket: SocketAddr,
    hits: Arc<Mutex<BTreeMap<String, usize>>>,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
}

impl Server {
    pub fn new() -> Self {
        let hits = Arc::new(Mutex::new(BTreeMap::new()));

        let hitcounter = {
            let hits = hits.clone();
            move |extract::OriginalUri(uri): extract::OriginalUri,
                  req: extract::Request,
                  next: middleware::Next| {
                let hits = hits.clone();
                async move {
                    {
                        let mut hits = hits.lock().unwrap();
                        *hits.entry(uri.path().to_owned()).or_default() += 1;
                    }
                    next.run(req).await
                }
            }
        };

        let router = Self::test_router().layer(middleware::from_fn(hitcounter));

        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let (shutdown, rx) = tokio::sync::oneshot::channel::<()>();
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                axum::serve(listener, router)
                    .with_graceful_shutdown(async {
                        let _ = rx.await;
                    })
                    .await
                    .unwrap();
            });
        });

        Self {
            socket,
            hits,
            shutdown: Some(shutdown),
        }
    }

    fn test_router() -> Router {
        Router::new()
            .route(
                "/garbage_data/{*tail}",
                get(|extract::Path(tail): extract::Path<String>| async move { tail }),
            )
            .route(
                "/blob/{len}",
                get(|extract::Path(len): extract::Path<usize>| async move { vec![b'x'; len] }),
            )
            .route(
                "/png",
                get(|| async { ([(header::CONTENT_TYPE, "image/png")], PNG_BYTES.to_vec()) }),
            )
            .route(
                "/redirect/{*path}",
                get(|extract::Path(path): extract::Path<String>| async move {
                    (StatusCode::FOUND, [(header::LOCATION, format!("/{path}"))])
                }),
            )
            .route(
                "/delay/{millis}/{*path}",
                get(
                    |extract::Path((millis, path)): extract::Path<(u64, String)>| async move {
                        tokio::time::sleep(Duration::from_millis(millis)).await;
                        (StatusCode::FOUND, [(header::LOCATION, format!("/{path}"))])
                    },
                ),
            )
            .route(
                "/respond_statuscode/{num}",
                get(|extract::Path(num): extract::Path<u16>| async move {
                    StatusCode::from_u16(num).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
                }),
            )
    }

    /// Returns the sum total of hits and clears the hit counts.
    pub fn accesses(&self) -> usize {
        let map = std::mem::take(&mut *self.hits.lock().unwrap());
        map.into_values().sum()
    }

    /// Returns a full URL pointing to the given path.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.socket.port(), path)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}
