use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, CaptureScreenshotParams,
};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use url::Url;

use glimpse_core::error::AppError;
use glimpse_core::model::PageMetadata;
use glimpse_core::traits::BrowserBackend;

/// Headless-browser backend using Chromium via the Chrome DevTools Protocol.
///
/// Each [`launch`](BrowserBackend::launch) call starts one Chromium process;
/// the scheduler opens multiple pages per worker up to its capacity. The
/// backend itself enforces nothing; capacity and coalescing live upstream.
#[derive(Clone, Default)]
pub struct CdpBackend;

/// One Chromium process plus its CDP event-handler task.
pub struct CdpWorker {
    browser: Mutex<Browser>,
    handler: JoinHandle<()>,
}

impl CdpBackend {
    pub fn new() -> Self {
        Self
    }

    /// Tries to locate the real Chrome/Chromium binary.
    ///
    /// On systems where Chromium is installed via snap, the wrapper at
    /// `/snap/bin/chromium` strips unknown CLI flags, breaking headless
    /// mode, so we look for the real binary inside the snap first and fall
    /// back to well-known system paths. `None` lets `chromiumoxide` do its
    /// own lookup.
    fn find_chrome_binary() -> Option<PathBuf> {
        if let Ok(p) = std::env::var("CHROME_BIN") {
            let path = PathBuf::from(&p);
            if path.exists() {
                return Some(path);
            }
        }

        let candidates: &[&str] = &[
            "/snap/chromium/current/usr/lib/chromium-browser/chrome",
            "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
        ];
        candidates.iter().map(PathBuf::from).find(|p| p.exists())
    }

    /// Pull one attribute out of the first element matching `selector`,
    /// `None` on any failure; extraction never fails a whole card.
    async fn attribute(page: &Page, selector: &str, name: &str) -> Option<String> {
        page.find_element(selector)
            .await
            .ok()?
            .attribute(name)
            .await
            .ok()
            .flatten()
    }

    /// `/favicon.ico` at the page's origin, the classic last resort.
    fn origin_favicon(url: &str) -> String {
        Url::parse(url)
            .ok()
            .and_then(|u| u.join("/favicon.ico").ok())
            .map(|u| u.to_string())
            .unwrap_or_default()
    }
}

impl BrowserBackend for CdpBackend {
    type Worker = CdpWorker;
    type Page = Page;

    async fn launch(&self, launch_args: &[String]) -> Result<CdpWorker, AppError> {
        let mut builder = BrowserConfig::builder().no_sandbox();

        if let Some(bin) = Self::find_chrome_binary() {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }

        builder = builder
            .window_size(1280, 800)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--no-first-run");
        for arg in launch_args {
            builder = builder.arg(arg);
        }

        let config = builder
            .build()
            .map_err(|e| AppError::PoolLaunch(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::PoolLaunch(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled continuously for the connection to
        // work.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("Browser CDP handler error: {event:?}");
                    break;
                }
            }
        });

        Ok(CdpWorker {
            browser: Mutex::new(browser),
            handler,
        })
    }

    async fn new_page(&self, worker: &CdpWorker) -> Result<Page, AppError> {
        let browser = worker.browser.lock().await;
        browser
            .new_page("about:blank")
            .await
            .map_err(|e| AppError::Page(format!("Failed to open page: {e}")))
    }

    async fn close_page(&self, page: Page) {
        if let Err(e) = page.close().await {
            tracing::debug!("Failed to close page: {e}");
        }
    }

    async fn close_worker(&self, worker: &CdpWorker) {
        let mut browser = worker.browser.lock().await;
        if let Err(e) = browser.close().await {
            tracing::warn!("Failed to close browser: {e}");
        }
        let _ = browser.wait().await;
        worker.handler.abort();
    }

    async fn page_metadata(
        &self,
        page: &Page,
        url: &str,
        timeout: Duration,
    ) -> Result<PageMetadata, AppError> {
        let result = tokio::time::timeout(timeout, async {
            page.goto(url).await.map_err(|e| AppError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;

            // Each field defaults independently; only the navigation itself
            // can fail the card.
            let title = page
                .get_title()
                .await
                .ok()
                .flatten()
                .filter(|t| !t.is_empty())
                .or_else(|| glimpse_core::key::hostname(url))
                .unwrap_or_else(|| url.to_string());
            let description =
                Self::attribute(page, "meta[property='og:description']", "content")
                    .await
                    .unwrap_or_default();
            let og_image = Self::attribute(page, "meta[property='og:image']", "content")
                .await
                .unwrap_or_default();
            let favicon = match Self::attribute(page, "link[rel='shortcut icon']", "href").await
            {
                Some(href) => href,
                None => Self::attribute(page, "link[rel='icon']", "href")
                    .await
                    .unwrap_or_else(|| Self::origin_favicon(url)),
            };

            Ok(PageMetadata {
                success: true,
                title,
                description,
                favicon,
                og_image,
                url: url.to_string(),
            })
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => Err(AppError::Timeout(timeout.as_millis() as u64)),
        }
    }

    async fn screenshot(
        &self,
        page: &Page,
        url: &str,
        timeout: Duration,
        quality: u8,
    ) -> Result<Vec<u8>, AppError> {
        let result = tokio::time::timeout(timeout, async {
            page.goto(url).await.map_err(|e| AppError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;
            page.wait_for_navigation()
                .await
                .map_err(|e| AppError::Navigation {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;

            let params = CaptureScreenshotParams {
                format: Some(CaptureScreenshotFormat::Jpeg),
                quality: Some(i64::from(quality.min(100))),
                ..Default::default()
            };
            page.screenshot(params)
                .await
                .map_err(|e| AppError::Screenshot(e.to_string()))
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => Err(AppError::Timeout(timeout.as_millis() as u64)),
        }
    }
}
