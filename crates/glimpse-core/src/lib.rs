//! Core scheduling and rendering for Glimpse: a browser-pool task scheduler
//! that enriches document link nodes into metadata cards and screenshot
//! previews.
//!
//! The expensive resource here is a small pool of headless-browser workers;
//! the scheduler gates bursty task batches against pool capacity (FIFO),
//! coalesces concurrent fetches of the same URL into one, and tears the
//! pool down once all work drains.

pub mod admission;
pub mod coalesce;
pub mod error;
pub mod executor;
pub mod key;
pub mod model;
pub mod options;
pub mod pool;
pub mod render;
pub mod testutil;
pub mod traits;
pub mod tree;

pub use error::AppError;
pub use executor::LinkProcessor;
pub use key::{DigestFn, compute_hash, normalize_url};
pub use model::{FetchOutcome, PageMetadata, RenderKind, ResponsiveImage};
pub use options::Options;
pub use pool::SchedulerContext;
pub use traits::{
    BrowserBackend, ImageDeriver, NullCache, NullDeriver, Reporter, ResultCache, TaskEvent,
    TracingReporter,
};
pub use tree::{Document, DocumentTree, LinkRef, Node};
