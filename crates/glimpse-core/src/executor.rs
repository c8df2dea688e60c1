//! Task executor: turns link nodes into rendered HTML fragments through the
//! persistent cache, the coalescing registry, and the worker pool.

use std::sync::Arc;

use futures::future::join_all;

use crate::coalesce::Claim;
use crate::error::AppError;
use crate::key::{self, DigestFn, ScreenshotArtifact};
use crate::model::{DeriveSpec, FetchOutcome, PageMetadata, RenderKind, TaskDescriptor};
use crate::options::Options;
use crate::pool::SchedulerContext;
use crate::render;
use crate::traits::{BrowserBackend, ImageDeriver, Reporter, ResultCache, TaskEvent};
use crate::tree::DocumentTree;

/// Target width handed to the responsive-image deriver.
const PREVIEW_IMAGE_WIDTH: u32 = 800;

/// Processes every link in a document tree into a card or preview.
///
/// Generic over its collaborators so hosts inject their own cache, image
/// pipeline, and reporting; the browser backend is shared through the
/// scheduler context, which may outlive a single [`process`](Self::process)
/// call in keep-warm mode.
pub struct LinkProcessor<B, C, R, D>
where
    B: BrowserBackend,
    C: ResultCache,
    R: Reporter,
    D: ImageDeriver,
{
    ctx: Arc<SchedulerContext<B>>,
    cache: C,
    reporter: R,
    deriver: D,
    options: Options,
    digest: Option<DigestFn>,
}

impl<B, C, R, D> LinkProcessor<B, C, R, D>
where
    B: BrowserBackend,
    C: ResultCache,
    R: Reporter,
    D: ImageDeriver,
{
    pub fn new(backend: B, cache: C, reporter: R, deriver: D, options: Options) -> Self {
        let ctx = Arc::new(SchedulerContext::new(backend, &options));
        Self::from_context(ctx, cache, reporter, deriver, options)
    }

    /// Build on an existing scheduler context, e.g. one kept warm across
    /// incremental builds.
    pub fn from_context(
        ctx: Arc<SchedulerContext<B>>,
        cache: C,
        reporter: R,
        deriver: D,
        options: Options,
    ) -> Self {
        Self {
            ctx,
            cache,
            reporter,
            deriver,
            options,
            digest: None,
        }
    }

    /// Install a host-supplied content digest for artifact naming.
    pub fn with_digest(mut self, digest: DigestFn) -> Self {
        self.digest = Some(digest);
        self
    }

    pub fn context(&self) -> &Arc<SchedulerContext<B>> {
        &self.ctx
    }

    /// Enrich every link node of `tree` in place.
    ///
    /// Never fails past this boundary except for a pool launch error: every
    /// per-task failure degrades to a default rendering plus a warning.
    pub async fn process<T: DocumentTree>(&self, tree: &mut T) -> Result<(), AppError> {
        let tasks: Vec<TaskDescriptor> = tree
            .links()
            .into_iter()
            .filter_map(|link| {
                let url = key::normalize_url(&link.url)?;
                let kind = RenderKind::classify(&link.text, &self.options.delimiter);
                Some(TaskDescriptor { link, url, kind })
            })
            .collect();
        if tasks.is_empty() {
            return Ok(());
        }

        // Resolve cache hits up front: a fully cached document never touches
        // the browser, so re-processing it is byte-identical and free.
        let mut misses = Vec::new();
        for task in tasks {
            let ckey = key::cache_key(task.kind, &task.url);
            match self.cache.get(&ckey).await {
                Ok(Some(html)) => {
                    self.reporter.report(TaskEvent::CacheHit {
                        url: &task.url,
                        kind: task.kind,
                    });
                    tree.replace_with_html(task.link.id, html);
                }
                Ok(None) => misses.push(task),
                Err(e) => {
                    tracing::warn!(url = %task.url, error = %e, "Result cache read failed");
                    misses.push(task);
                }
            }
        }
        if misses.is_empty() {
            return Ok(());
        }

        if let Err(e) = tokio::fs::create_dir_all(&self.options.cache_dir).await {
            tracing::warn!(
                dir = %self.options.cache_dir.display(),
                error = %e,
                "Could not create artifact directory, previews will degrade"
            );
        }

        self.ctx
            .ensure_pool(self.options.pool_size, &self.options.launch_args)
            .await?;
        self.reporter.report(TaskEvent::PoolLaunched {
            workers: self.options.pool_size,
            capacity: self.options.capacity(),
        });

        self.ctx.admit(misses.len()).await;
        self.reporter.report(TaskEvent::BatchAdmitted {
            tasks: misses.len(),
        });

        let results = join_all(misses.into_iter().map(|task| self.run_task(task))).await;
        for (id, html) in results {
            tree.replace_with_html(id, html);
        }

        if self.ctx.teardown().await {
            self.reporter.report(TaskEvent::PoolClosed);
        }
        Ok(())
    }

    /// One unit of work: coalesce, fetch, render, write through.
    async fn run_task(&self, task: TaskDescriptor) -> (usize, String) {
        let TaskDescriptor { link, url, kind } = task;
        let coalesce_key = key::compute_hash(&url);

        let outcome = match self.ctx.registry.begin(kind, &coalesce_key) {
            Claim::Done(outcome) => {
                self.reporter.report(TaskEvent::Coalesced { url: &url, kind });
                outcome
            }
            Claim::Follower(rx) => {
                self.reporter.report(TaskEvent::Coalesced { url: &url, kind });
                match rx.await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        // Leader vanished without completing; degrade like
                        // any other per-task failure.
                        let e = AppError::CoalesceAbandoned(coalesce_key);
                        self.reporter.report(TaskEvent::FetchFailed {
                            url: &url,
                            error: &e.to_string(),
                        });
                        self.fallback_outcome(kind, &url, &link.text)
                    }
                }
            }
            Claim::Leader => {
                self.reporter
                    .report(TaskEvent::FetchStarted { url: &url, kind });
                let outcome = self.lead_fetch(kind, &url, &link.text).await;
                self.ctx
                    .registry
                    .complete(kind, &coalesce_key, outcome.clone());
                // Cards are cached whenever the page was reachable, even
                // with partially defaulted fields; previews only when the
                // capture succeeded. Followers never write: the value is
                // the leader's.
                if outcome.success {
                    let ckey = key::cache_key(kind, &url);
                    if let Err(e) = self.cache.set(&ckey, &outcome.html).await {
                        tracing::warn!(%url, error = %e, "Result cache write failed");
                    }
                }
                outcome
            }
        };

        (link.id, outcome.html)
    }

    /// Leader path: checkout a page, fetch, render, checkin.
    async fn lead_fetch(&self, kind: RenderKind, url: &str, text: &str) -> FetchOutcome {
        let lease = match self.ctx.checkout().await {
            Ok(lease) => lease,
            Err(e) => {
                self.reporter.report(TaskEvent::FetchFailed {
                    url,
                    error: &e.to_string(),
                });
                return self.fallback_outcome(kind, url, text);
            }
        };

        let outcome = match kind {
            RenderKind::Card => self.fetch_card(&lease, url).await,
            RenderKind::Preview => self.fetch_preview(&lease, url, text).await,
        };

        self.ctx.checkin(lease).await;
        outcome
    }

    async fn fetch_card(&self, lease: &crate::pool::PageLease<B>, url: &str) -> FetchOutcome {
        let meta = match self
            .ctx
            .backend
            .page_metadata(lease.page(), url, self.options.timeout())
            .await
        {
            Ok(meta) => meta,
            Err(e) => {
                self.reporter.report(TaskEvent::FetchFailed {
                    url,
                    error: &e.to_string(),
                });
                PageMetadata::fallback(url, &self.options.error_title)
            }
        };
        FetchOutcome {
            html: render::card_html(&meta, self.options.show_favicon),
            success: meta.success,
        }
    }

    async fn fetch_preview(
        &self,
        lease: &crate::pool::PageLease<B>,
        url: &str,
        text: &str,
    ) -> FetchOutcome {
        let bytes = match self
            .ctx
            .backend
            .screenshot(
                lease.page(),
                url,
                self.options.timeout(),
                self.options.screenshot_quality,
            )
            .await
        {
            Ok(bytes) => bytes,
            Err(e) => {
                self.reporter.report(TaskEvent::FetchFailed {
                    url,
                    error: &e.to_string(),
                });
                return FetchOutcome {
                    html: render::preview_html(text, url, None),
                    success: false,
                };
            }
        };

        let artifact =
            ScreenshotArtifact::new(url, &self.options.cache_dir, self.digest.as_ref());
        if let Err(e) = tokio::fs::write(&artifact.path, &bytes).await {
            self.reporter.report(TaskEvent::FetchFailed {
                url,
                error: &format!("writing {}: {e}", artifact.path.display()),
            });
            return FetchOutcome {
                html: render::preview_html(text, url, None),
                success: false,
            };
        }

        let spec = DeriveSpec {
            width: PREVIEW_IMAGE_WIDTH,
            quality: self.options.screenshot_quality,
        };
        match self.deriver.derive(&artifact.path, spec).await {
            Ok(image) => FetchOutcome {
                html: render::preview_html(text, url, Some(&image)),
                success: true,
            },
            Err(e) => {
                self.reporter.report(TaskEvent::FetchFailed {
                    url,
                    error: &e.to_string(),
                });
                FetchOutcome {
                    html: render::preview_html(text, url, None),
                    success: false,
                }
            }
        }
    }

    /// Default rendering for tasks that never got a usable fetch result.
    fn fallback_outcome(&self, kind: RenderKind, url: &str, text: &str) -> FetchOutcome {
        let html = match kind {
            RenderKind::Card => render::card_html(
                &PageMetadata::fallback(url, &self.options.error_title),
                self.options.show_favicon,
            ),
            RenderKind::Preview => render::preview_html(text, url, None),
        };
        FetchOutcome {
            html,
            success: false,
        }
    }
}
