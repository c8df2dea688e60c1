use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use url::Url;

use crate::model::RenderKind;

/// Host-supplied content digest, used for stable screenshot artifact names
/// across separate builds. Falls back to [`compute_hash`] when absent.
pub type DigestFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Normalize a raw link target into a canonical URL string.
///
/// Bare hostnames get an `https://` scheme prepended. Returns `None` when
/// the result still does not parse; such links are left untouched.
pub fn normalize_url(raw: &str) -> Option<String> {
    let candidate = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    Url::parse(&candidate).ok().map(|u| u.to_string())
}

/// Extract the hostname from a normalized URL, used as the fallback card
/// title for unreachable pages.
pub fn hostname(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}

/// Key into the persistent result cache: kind prefix + normalized URL.
pub fn cache_key(kind: RenderKind, url: &str) -> String {
    format!("{}-{}", kind.prefix(), url)
}

/// On-disk name and location of one screenshot artifact.
///
/// Named by the content digest of the URL with a fixed `.jpg` extension so
/// identical URLs across builds resolve to the same file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenshotArtifact {
    pub name: String,
    pub path: PathBuf,
}

impl ScreenshotArtifact {
    pub fn new(url: &str, cache_dir: &Path, digest: Option<&DigestFn>) -> Self {
        let name = match digest {
            Some(f) => f(url),
            None => compute_hash(url),
        };
        let path = cache_dir.join(format!("{name}.jpg"));
        Self { name, path }
    }
}
