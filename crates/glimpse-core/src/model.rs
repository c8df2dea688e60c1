use crate::key;
use crate::tree::LinkRef;

/// How a link is rendered, decided once at classification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderKind {
    /// Metadata summary: title, description, favicon, social image.
    Card,
    /// Screenshot of the target page alongside the original link text.
    Preview,
}

impl RenderKind {
    /// Prefix for persistent-cache keys, kept byte-compatible with caches
    /// written by the original plugin.
    pub fn prefix(&self) -> &'static str {
        match self {
            RenderKind::Card => "linkCard",
            RenderKind::Preview => "linkPreview",
        }
    }

    /// Classify a link by its text: the configured delimiter means card,
    /// anything else is a preview.
    pub fn classify(text: &str, delimiter: &str) -> Self {
        if text == delimiter {
            RenderKind::Card
        } else {
            RenderKind::Preview
        }
    }
}

/// Metadata extracted from a rendered page.
///
/// `success` means the navigation succeeded; individual fields may still
/// carry their defaults when extraction of that field failed.
#[derive(Debug, Clone)]
pub struct PageMetadata {
    pub success: bool,
    pub title: String,
    pub description: String,
    pub favicon: String,
    pub og_image: String,
    pub url: String,
}

impl PageMetadata {
    /// Defaults used when the page is unreachable: hostname-derived title
    /// (or the configured error title) and blank everything else.
    pub fn fallback(url: &str, error_title: &str) -> Self {
        Self {
            success: false,
            title: key::hostname(url).unwrap_or_else(|| error_title.to_string()),
            description: String::new(),
            favicon: String::new(),
            og_image: String::new(),
            url: url.to_string(),
        }
    }
}

/// Result of one coalesced fetch, shared verbatim with every follower.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub html: String,
    /// Cards: the page was reachable. Previews: the capture succeeded.
    pub success: bool,
}

/// Responsive derivatives of a screenshot artifact, produced by the host's
/// image pipeline.
#[derive(Debug, Clone, Default)]
pub struct ResponsiveImage {
    pub src: String,
    pub src_set: String,
    pub sizes: String,
    pub placeholder: String,
}

/// Parameters handed to the image deriver for one screenshot.
#[derive(Debug, Clone, Copy)]
pub struct DeriveSpec {
    pub width: u32,
    pub quality: u8,
}

/// One unit of work: a link node plus its normalized URL and render kind.
///
/// Owned by exactly one task-executor invocation; consumed when the node is
/// mutated with the final HTML.
#[derive(Debug, Clone)]
pub struct TaskDescriptor {
    pub link: LinkRef,
    pub url: String,
    pub kind: RenderKind,
}
