use std::path::PathBuf;

use glimpse_core::error::AppError;
use glimpse_core::key::compute_hash;
use glimpse_core::traits::ResultCache;

/// Persistent result cache: one file per key under a cache directory,
/// surviving across incremental builds.
///
/// Keys are hashed into file names so arbitrary strings (they contain full
/// URLs) stay filesystem-safe.
#[derive(Debug, Clone)]
pub struct FsCache {
    dir: PathBuf,
}

impl FsCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.html", compute_hash(key)))
    }
}

impl ResultCache for FsCache {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Cache(format!("read {key}: {e}"))),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AppError::Cache(format!("mkdir {}: {e}", self.dir.display())))?;
        tokio::fs::write(self.path_for(key), value)
            .await
            .map_err(|e| AppError::Cache(format!("write {key}: {e}")))
    }
}
