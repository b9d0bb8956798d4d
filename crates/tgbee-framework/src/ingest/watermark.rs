//! Persistence of the polling watermark.
//!
//! The watermark is the last acknowledged `update_id`: a single integer and
//! the only state that survives a restart.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;

#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// The stored watermark, `None` on first start.
    async fn load(&self) -> io::Result<Option<i64>>;

    async fn store(&self, update_id: i64) -> io::Result<()>;
}

/// Keeps the watermark in memory. Clones share the value.
#[derive(Debug, Clone, Default)]
pub struct MemoryWatermarkStore {
    value: Arc<Mutex<Option<i64>>>,
}

impl MemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(update_id: i64) -> Self {
        Self {
            value: Arc::new(Mutex::new(Some(update_id))),
        }
    }

    pub fn get(&self) -> Option<i64> {
        *self.value.lock()
    }
}

#[async_trait]
impl WatermarkStore for MemoryWatermarkStore {
    async fn load(&self) -> io::Result<Option<i64>> {
        Ok(self.get())
    }

    async fn store(&self, update_id: i64) -> io::Result<()> {
        *self.value.lock() = Some(update_id);
        Ok(())
    }
}

/// Stores the watermark as a decimal integer in a file.
///
/// Writes go to a sibling temporary file that is renamed over the target, so
/// a crash leaves either the old or the new value.
#[derive(Debug, Clone)]
pub struct FileWatermarkStore {
    path: PathBuf,
}

impl FileWatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl WatermarkStore for FileWatermarkStore {
    async fn load(&self) -> io::Result<Option<i64>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                let content = content.trim();
                if content.is_empty() {
                    return Ok(None);
                }
                content.parse().map(Some).map_err(|e| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("bad watermark in {}: {e}", self.path.display()),
                    )
                })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn store(&self, update_id: i64) -> io::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.temp_path();
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(format!("{update_id}\n").as_bytes()).await?;
        // The contents must be on disk before the rename makes them visible.
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &self.path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_store_roundtrip_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileWatermarkStore::new(dir.path().join("state/offset"));
        assert_eq!(store.load().await.unwrap(), None);

        store.store(41).await.unwrap();
        store.store(42).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(42));
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn test_file_store_replaces_stale_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileWatermarkStore::new(dir.path().join("offset"));
        store.store(7).await.unwrap();
        // a write interrupted before the rename
        std::fs::write(store.temp_path(), "9").unwrap();
        assert_eq!(store.load().await.unwrap(), Some(7));

        store.store(10).await.unwrap();
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "10\n");
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn test_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offset");
        std::fs::write(&path, "not a number").unwrap();
        let err = FileWatermarkStore::new(path).load().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
