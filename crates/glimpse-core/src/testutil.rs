//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests. All mocks use
//! `Arc<Mutex<_>>` for interior mutability, allowing test assertions on
//! recorded calls.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::AppError;
use crate::model::{DeriveSpec, PageMetadata, ResponsiveImage};
use crate::traits::{BrowserBackend, ImageDeriver, Reporter, ResultCache, TaskEvent};

// ---------------------------------------------------------------------------
// MockBackend
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockCounters {
    launches: usize,
    closed_workers: usize,
    pages_opened: usize,
    closed_pages: usize,
    metadata_fetches: HashMap<String, usize>,
    screenshot_fetches: HashMap<String, usize>,
}

#[derive(Default)]
struct MockScript {
    launch_delay: Duration,
    fetch_delay: Duration,
    /// Succeed this many launches, then fail the rest.
    launch_ok_before_failure: Option<usize>,
    /// Fail this many `new_page` calls before succeeding.
    page_failures: usize,
    metadata: HashMap<String, PageMetadata>,
    navigation_failures: HashMap<String, String>,
    screenshot_failures: HashMap<String, String>,
}

/// Mock browser backend with scripted outcomes and recorded calls.
#[derive(Clone)]
pub struct MockBackend {
    script: Arc<Mutex<MockScript>>,
    counters: Arc<Mutex<MockCounters>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(MockScript::default())),
            counters: Arc::new(Mutex::new(MockCounters::default())),
        }
    }

    /// Delay every worker launch, to give concurrent initializers a window.
    pub fn with_launch_delay(self, delay: Duration) -> Self {
        self.script.lock().unwrap().launch_delay = delay;
        self
    }

    /// Delay every navigation, to give coalescing followers a window.
    pub fn with_fetch_delay(self, delay: Duration) -> Self {
        self.script.lock().unwrap().fetch_delay = delay;
        self
    }

    /// Let `ok` launches succeed, then fail every later one.
    pub fn fail_launch_after(self, ok: usize) -> Self {
        self.script.lock().unwrap().launch_ok_before_failure = Some(ok);
        self
    }

    /// Fail the next `n` page opens.
    pub fn with_page_failures(self, n: usize) -> Self {
        self.script.lock().unwrap().page_failures = n;
        self
    }

    /// Script the metadata returned for one URL.
    pub fn with_metadata(self, url: &str, meta: PageMetadata) -> Self {
        self.script
            .lock()
            .unwrap()
            .metadata
            .insert(url.to_string(), meta);
        self
    }

    /// Make navigation to one URL fail (affects metadata fetches).
    pub fn with_navigation_failure(self, url: &str, message: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .navigation_failures
            .insert(url.to_string(), message.to_string());
        self
    }

    /// Make screenshot capture for one URL fail.
    pub fn with_screenshot_failure(self, url: &str, message: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .screenshot_failures
            .insert(url.to_string(), message.to_string());
        self
    }

    /// Stop failing screenshots for a URL (for retry tests).
    pub fn clear_screenshot_failure(&self, url: &str) {
        self.script.lock().unwrap().screenshot_failures.remove(url);
    }

    pub fn launches(&self) -> usize {
        self.counters.lock().unwrap().launches
    }

    pub fn closed_workers(&self) -> usize {
        self.counters.lock().unwrap().closed_workers
    }

    pub fn pages_opened(&self) -> usize {
        self.counters.lock().unwrap().pages_opened
    }

    pub fn closed_pages(&self) -> usize {
        self.counters.lock().unwrap().closed_pages
    }

    pub fn metadata_fetches(&self, url: &str) -> usize {
        *self
            .counters
            .lock()
            .unwrap()
            .metadata_fetches
            .get(url)
            .unwrap_or(&0)
    }

    pub fn screenshot_fetches(&self, url: &str) -> usize {
        *self
            .counters
            .lock()
            .unwrap()
            .screenshot_fetches
            .get(url)
            .unwrap_or(&0)
    }

    pub fn total_fetches(&self) -> usize {
        let c = self.counters.lock().unwrap();
        c.metadata_fetches.values().sum::<usize>() + c.screenshot_fetches.values().sum::<usize>()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl BrowserBackend for MockBackend {
    type Worker = usize;
    type Page = usize;

    async fn launch(&self, _launch_args: &[String]) -> Result<usize, AppError> {
        let (delay, fail) = {
            let script = self.script.lock().unwrap();
            let launched = self.counters.lock().unwrap().launches;
            let fail = script
                .launch_ok_before_failure
                .is_some_and(|ok| launched >= ok);
            (script.launch_delay, fail)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(AppError::PoolLaunch("scripted launch failure".into()));
        }
        let mut counters = self.counters.lock().unwrap();
        counters.launches += 1;
        Ok(counters.launches)
    }

    async fn new_page(&self, _worker: &usize) -> Result<usize, AppError> {
        {
            let mut script = self.script.lock().unwrap();
            if script.page_failures > 0 {
                script.page_failures -= 1;
                return Err(AppError::Page("scripted page failure".into()));
            }
        }
        let mut counters = self.counters.lock().unwrap();
        counters.pages_opened += 1;
        Ok(counters.pages_opened)
    }

    async fn close_page(&self, _page: usize) {
        self.counters.lock().unwrap().closed_pages += 1;
    }

    async fn close_worker(&self, _worker: &usize) {
        self.counters.lock().unwrap().closed_workers += 1;
    }

    async fn page_metadata(
        &self,
        _page: &usize,
        url: &str,
        _timeout: Duration,
    ) -> Result<PageMetadata, AppError> {
        let (delay, result) = {
            let script = self.script.lock().unwrap();
            let result = if let Some(message) = script.navigation_failures.get(url) {
                if message == "timeout" {
                    Err(AppError::Timeout(30_000))
                } else {
                    Err(AppError::Navigation {
                        url: url.to_string(),
                        message: message.clone(),
                    })
                }
            } else {
                Ok(script.metadata.get(url).cloned().unwrap_or(PageMetadata {
                    success: true,
                    title: format!("Title of {url}"),
                    description: "A scripted description".to_string(),
                    favicon: String::new(),
                    og_image: String::new(),
                    url: url.to_string(),
                }))
            };
            (script.fetch_delay, result)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut counters = self.counters.lock().unwrap();
        *counters
            .metadata_fetches
            .entry(url.to_string())
            .or_insert(0) += 1;
        result
    }

    async fn screenshot(
        &self,
        _page: &usize,
        url: &str,
        _timeout: Duration,
        _quality: u8,
    ) -> Result<Vec<u8>, AppError> {
        let (delay, result) = {
            let script = self.script.lock().unwrap();
            let result = match script.screenshot_failures.get(url) {
                Some(message) => Err(AppError::Screenshot(message.clone())),
                // JPEG magic plus filler, enough to look like an image
                None => Ok(vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10]),
            };
            (script.fetch_delay, result)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut counters = self.counters.lock().unwrap();
        *counters
            .screenshot_fetches
            .entry(url.to_string())
            .or_insert(0) += 1;
        result
    }
}

// ---------------------------------------------------------------------------
// MemoryCache
// ---------------------------------------------------------------------------

/// In-memory result cache recording every write.
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn preload(self, key: &str, value: &str) -> Self {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    pub fn peek(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).cloned()
    }
}

impl ResultCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingReporter
// ---------------------------------------------------------------------------

/// Reporter that records a compact label per event.
#[derive(Clone, Default)]
pub struct RecordingReporter {
    events: Arc<Mutex<Vec<String>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, label: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with(label))
            .count()
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, event: TaskEvent<'_>) {
        let label = match event {
            TaskEvent::PoolLaunched { .. } => "pool-launched".to_string(),
            TaskEvent::BatchAdmitted { tasks } => format!("batch-admitted:{tasks}"),
            TaskEvent::CacheHit { url, .. } => format!("cache-hit:{url}"),
            TaskEvent::FetchStarted { url, .. } => format!("fetch-started:{url}"),
            TaskEvent::FetchFailed { url, .. } => format!("fetch-failed:{url}"),
            TaskEvent::Coalesced { url, .. } => format!("coalesced:{url}"),
            TaskEvent::PoolClosed => "pool-closed".to_string(),
        };
        self.events.lock().unwrap().push(label);
    }
}

// ---------------------------------------------------------------------------
// FixedDeriver
// ---------------------------------------------------------------------------

/// Deriver that returns a fixed responsive rendition for any artifact.
#[derive(Clone, Default)]
pub struct FixedDeriver;

impl ImageDeriver for FixedDeriver {
    async fn derive(&self, path: &Path, spec: DeriveSpec) -> Result<ResponsiveImage, AppError> {
        let src = path.to_string_lossy().into_owned();
        Ok(ResponsiveImage {
            src_set: format!("{src} {}w", spec.width),
            sizes: format!("(max-width: {0}px) 100vw, {0}px", spec.width),
            placeholder: String::new(),
            src,
        })
    }
}
