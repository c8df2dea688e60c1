use thiserror::Error;

/// Application-wide error types for Glimpse.
#[derive(Error, Debug)]
pub enum AppError {
    /// Launching a browser worker failed. Fatal: there is no partial pool.
    #[error("Pool launch error: {0}")]
    PoolLaunch(String),

    /// Navigating a page to the target URL failed.
    #[error("Navigation error for {url}: {message}")]
    Navigation { url: String, message: String },

    /// Navigation exceeded the configured timeout.
    #[error("Navigation timed out after {0} ms")]
    Timeout(u64),

    /// Reading metadata out of a rendered page failed.
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Capturing a screenshot failed.
    #[error("Screenshot error: {0}")]
    Screenshot(String),

    /// Opening or closing a worker page failed.
    #[error("Page error: {0}")]
    Page(String),

    /// The persistent result cache failed to read or write.
    #[error("Cache error: {0}")]
    Cache(String),

    /// A coalescing leader went away without publishing a result.
    #[error("Coalesced fetch abandoned for key {0}")]
    CoalesceAbandoned(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error must abort the whole document build.
    ///
    /// Everything except a failed pool launch is recovered per task with a
    /// default rendering and a warning.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::PoolLaunch(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pool_launch_is_fatal() {
        assert!(AppError::PoolLaunch("no chrome".into()).is_fatal());
        assert!(!AppError::Timeout(30_000).is_fatal());
        assert!(
            !AppError::Navigation {
                url: "https://example.com".into(),
                message: "dns".into(),
            }
            .is_fatal()
        );
        assert!(!AppError::Screenshot("blank".into()).is_fatal());
        assert!(!AppError::Cache("disk full".into()).is_fatal());
    }
}
