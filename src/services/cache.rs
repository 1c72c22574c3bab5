use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::models::analysis::Platform;

/// Blob key holding the last-known-good enrichment results per platform.
const CACHE_KEY: &str = "social_profiles";

/// On-device cache of final enrichment results.
///
/// The blob is shared across platforms, so a merge must never clobber a
/// sibling platform's data. Implementations expose read-merge-write as one
/// atomic operation.
#[async_trait]
pub trait ProfileCache: Send + Sync {
    /// Merge `result` into the blob under the platform's member, preserving
    /// every other member.
    async fn merge_result(&self, platform: Platform, result: &Value) -> Result<(), CacheError>;

    /// Current blob contents (an empty object when nothing is cached).
    async fn snapshot(&self) -> Result<Value, CacheError>;
}

/// File-backed profile cache: a single JSON object per data directory.
pub struct FileProfileCache {
    path: PathBuf,
    // Serializes read-merge-write cycles; partial merges cannot interleave.
    lock: Mutex<()>,
}

impl FileProfileCache {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(format!("{CACHE_KEY}.json")),
            lock: Mutex::new(()),
        }
    }

    /// An unreadable or corrupt blob degrades to empty rather than failing
    /// the merge; the cache is a best-effort copy of the row-store result.
    async fn load_blob(&self) -> Map<String, Value> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(map)) => map,
                Ok(_) | Err(_) => {
                    tracing::warn!(path = %self.path.display(), "Profile cache blob is corrupt, starting empty");
                    Map::new()
                }
            },
            Err(_) => Map::new(),
        }
    }
}

#[async_trait]
impl ProfileCache for FileProfileCache {
    async fn merge_result(&self, platform: Platform, result: &Value) -> Result<(), CacheError> {
        let _guard = self.lock.lock().await;

        let mut blob = self.load_blob().await;
        blob.insert(platform.cache_member().to_string(), result.clone());

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let serialized = serde_json::to_string_pretty(&Value::Object(blob))?;
        tokio::fs::write(&self.path, serialized).await?;

        Ok(())
    }

    async fn snapshot(&self) -> Result<Value, CacheError> {
        let _guard = self.lock.lock().await;
        Ok(Value::Object(self.load_blob().await))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}
