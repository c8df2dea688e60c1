use std::future::Future;
use std::path::Path;
use std::time::Duration;

use crate::error::AppError;
use crate::model::{DeriveSpec, PageMetadata, RenderKind, ResponsiveImage};

/// Headless-browser automation backend.
///
/// One `Worker` is a browser process that hosts multiple concurrently open
/// pages; one `Page` is exclusively owned by a single task between checkout
/// and checkin. The scheduler enforces capacity upstream; implementations
/// never gate `new_page` themselves.
pub trait BrowserBackend: Send + Sync + Clone + 'static {
    type Worker: Send + Sync + 'static;
    type Page: Send + Sync + 'static;

    /// Launch one worker. Called `pool_size` times by the first initializer;
    /// any failure is fatal to the whole pool.
    fn launch(
        &self,
        launch_args: &[String],
    ) -> impl Future<Output = Result<Self::Worker, AppError>> + Send;

    fn new_page(
        &self,
        worker: &Self::Worker,
    ) -> impl Future<Output = Result<Self::Page, AppError>> + Send;

    /// Close a checked-in page. Failures are logged, never propagated.
    fn close_page(&self, page: Self::Page) -> impl Future<Output = ()> + Send;

    fn close_worker(&self, worker: &Self::Worker) -> impl Future<Output = ()> + Send;

    /// Navigate and extract card metadata. `Err` means the navigation itself
    /// failed; per-field extraction failures default inside the returned
    /// metadata instead.
    fn page_metadata(
        &self,
        page: &Self::Page,
        url: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<PageMetadata, AppError>> + Send;

    /// Navigate and capture a JPEG screenshot.
    fn screenshot(
        &self,
        page: &Self::Page,
        url: &str,
        timeout: Duration,
        quality: u8,
    ) -> impl Future<Output = Result<Vec<u8>, AppError>> + Send;
}

/// Persistent key-value result cache, surviving across incremental builds.
pub trait ResultCache: Send + Sync + Clone {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, AppError>> + Send;

    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// A no-op cache for hosts without persistence.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCache;

impl ResultCache for NullCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, AppError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), AppError> {
        Ok(())
    }
}

/// Responsive-image derivative generator consumed from the host.
pub trait ImageDeriver: Send + Sync + Clone {
    fn derive(
        &self,
        path: &Path,
        spec: DeriveSpec,
    ) -> impl Future<Output = Result<ResponsiveImage, AppError>> + Send;
}

/// Passthrough deriver: the artifact itself is the only rendition.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDeriver;

impl ImageDeriver for NullDeriver {
    async fn derive(&self, path: &Path, _spec: DeriveSpec) -> Result<ResponsiveImage, AppError> {
        Ok(ResponsiveImage {
            src: path.to_string_lossy().into_owned(),
            ..ResponsiveImage::default()
        })
    }
}

/// Events emitted while processing a document, for monitoring/logging.
#[derive(Debug, Clone)]
pub enum TaskEvent<'a> {
    PoolLaunched {
        workers: usize,
        capacity: usize,
    },
    BatchAdmitted {
        tasks: usize,
    },
    CacheHit {
        url: &'a str,
        kind: RenderKind,
    },
    FetchStarted {
        url: &'a str,
        kind: RenderKind,
    },
    FetchFailed {
        url: &'a str,
        error: &'a str,
    },
    Coalesced {
        url: &'a str,
        kind: RenderKind,
    },
    PoolClosed,
}

/// Trait for receiving task events (decoupled logging).
pub trait Reporter: Send + Sync {
    fn report(&self, event: TaskEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, event: TaskEvent<'_>) {
        match event {
            TaskEvent::PoolLaunched { workers, capacity } => {
                tracing::info!(%workers, %capacity, "Browser pool ready");
            }
            TaskEvent::BatchAdmitted { tasks } => {
                tracing::debug!(%tasks, "Batch admitted");
            }
            TaskEvent::CacheHit { url, kind } => {
                tracing::debug!(%url, kind = kind.prefix(), "Cache hit");
            }
            TaskEvent::FetchStarted { url, kind } => {
                tracing::debug!(%url, kind = kind.prefix(), "Fetching");
            }
            TaskEvent::FetchFailed { url, error } => {
                tracing::warn!(%url, %error, "Unable to fetch page, using fallback");
            }
            TaskEvent::Coalesced { url, kind } => {
                tracing::debug!(%url, kind = kind.prefix(), "Joined in-flight fetch");
            }
            TaskEvent::PoolClosed => {
                tracing::info!("Browser pool closed");
            }
        }
    }
}
