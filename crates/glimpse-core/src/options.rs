use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_SCREENSHOT_QUALITY: u8 = 80;
const DEFAULT_POOL_SIZE: usize = 2;
const DEFAULT_PAGES_PER_WORKER: usize = 5;

/// Processing options, a superset of the knobs exposed to the host.
///
/// All fields have defaults so a host can write `Options::default()` and
/// only override what it cares about via the `with_*` builders.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Options {
    /// Link text that flags a link to be rendered as a card.
    /// Any other text renders a preview.
    pub delimiter: String,

    /// Per-navigation timeout in milliseconds.
    pub timeout_ms: u64,

    /// JPEG quality for preview screenshots (0–100).
    #[serde(deserialize_with = "de_quality")]
    pub screenshot_quality: u8,

    /// Whether card HTML includes the favicon.
    pub show_favicon: bool,

    /// Number of browser workers to launch.
    #[serde(deserialize_with = "de_at_least_one")]
    pub pool_size: usize,

    /// Page slots per worker; total capacity = `pool_size * pages_per_worker`.
    #[serde(deserialize_with = "de_at_least_one")]
    pub pages_per_worker: usize,

    /// Extra flags passed through to the browser backend at launch.
    pub launch_args: Vec<String>,

    /// Title used for cards when the page is unreachable and the URL has no
    /// usable hostname.
    pub error_title: String,

    /// Keep the worker pool alive after the build drains (incremental /
    /// development builds relaunch too often otherwise).
    pub keep_warm: bool,

    /// Directory for screenshot artifacts.
    pub cache_dir: PathBuf,
}

// Config files get the same clamps the `with_*` builders enforce; a
// zero-capacity pool would stall every admitted batch.
fn de_at_least_one<'de, D: Deserializer<'de>>(d: D) -> Result<usize, D::Error> {
    usize::deserialize(d).map(|v| v.max(1))
}

fn de_quality<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
    u8::deserialize(d).map(|v| v.min(100))
}

impl Default for Options {
    fn default() -> Self {
        Self {
            delimiter: "$card".to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            screenshot_quality: DEFAULT_SCREENSHOT_QUALITY,
            show_favicon: true,
            pool_size: DEFAULT_POOL_SIZE,
            pages_per_worker: DEFAULT_PAGES_PER_WORKER,
            launch_args: Vec::new(),
            error_title: "Not Found Site".to_string(),
            keep_warm: false,
            cache_dir: PathBuf::from(".cache/glimpse"),
        }
    }
}

impl Options {
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_screenshot_quality(mut self, quality: u8) -> Self {
        self.screenshot_quality = quality.min(100);
        self
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    pub fn with_pages_per_worker(mut self, pages: usize) -> Self {
        self.pages_per_worker = pages.max(1);
        self
    }

    pub fn with_show_favicon(mut self, show: bool) -> Self {
        self.show_favicon = show;
        self
    }

    pub fn with_launch_args(mut self, args: Vec<String>) -> Self {
        self.launch_args = args;
        self
    }

    pub fn with_error_title(mut self, title: impl Into<String>) -> Self {
        self.error_title = title.into();
        self
    }

    pub fn with_keep_warm(mut self, keep_warm: bool) -> Self {
        self.keep_warm = keep_warm;
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Total worker-page slots.
    pub fn capacity(&self) -> usize {
        self.pool_size * self.pages_per_worker
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
