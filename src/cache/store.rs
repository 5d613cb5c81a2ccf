//! Local on-disk content-addressed cache.
//!
//! One file per chunk id (`chunk_<id>`) and one per materialized file
//! (`file_<id>`), both derived solely from the id. Writes are idempotent:
//! content addressing means no two writers can legitimately disagree on the
//! bytes for a given path, so an already-present entry is left untouched.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::error::{CacheError, CacheResult};

#[derive(Debug, Clone)]
pub struct ChunkCache {
    root: PathBuf,
}

impl ChunkCache {
    /// Open the cache, creating the directory on first use.
    pub async fn open(root: impl AsRef<Path>) -> CacheResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Path of a chunk entry, derived solely from its id.
    pub fn chunk_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("chunk_{id}"))
    }

    /// Path of a materialized file entry.
    pub fn file_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("file_{id}"))
    }

    pub async fn contains_chunk(&self, id: &str) -> bool {
        fs::try_exists(self.chunk_path(id)).await.unwrap_or(false)
    }

    pub async fn contains_file(&self, id: &str) -> bool {
        fs::try_exists(self.file_path(id)).await.unwrap_or(false)
    }

    /// Write chunk bytes. No-op if the entry already exists; otherwise the
    /// bytes land in a temp file first and are renamed into place so readers
    /// never observe a partial entry.
    pub async fn write_chunk(&self, id: &str, data: &[u8]) -> CacheResult<()> {
        self.write_entry(self.chunk_path(id), data).await
    }

    pub async fn write_file(&self, id: &str, data: &[u8]) -> CacheResult<()> {
        self.write_entry(self.file_path(id), data).await
    }

    pub async fn read_chunk(&self, id: &str) -> CacheResult<Bytes> {
        self.read_entry(self.chunk_path(id), id).await
    }

    pub async fn read_file(&self, id: &str) -> CacheResult<Bytes> {
        self.read_entry(self.file_path(id), id).await
    }

    async fn write_entry(&self, path: PathBuf, data: &[u8]) -> CacheResult<()> {
        if fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }

        let tmp = path.with_extension("tmp");
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(data).await?;
        file.flush().await?;
        drop(file);
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn read_entry(&self, path: PathBuf, id: &str) -> CacheResult<Bytes> {
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CacheError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
