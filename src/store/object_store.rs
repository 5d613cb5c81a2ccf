//! Top-level facade wiring the store together.
//!
//! `ObjectStore` owns the state database, the local cache, the transfer
//! client, and both assemblers, all running against one ledger backend
//! chosen by the caller.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;

use crate::assembler::FileAssembler;
use crate::cache::ChunkCache;
use crate::config::StoreConfig;
use crate::dirtree::{DirEntry, DirectoryAssembler};
use crate::ledger::Ledger;
use crate::state::{
    DownloadStatus, FileDownloadStatus, LifetimePolicy, StateStore, UploadStatus,
};
use crate::transfer::ChunkTransferClient;

use super::error::StoreResult;

pub struct ObjectStore {
    state: Arc<StateStore>,
    assembler: Arc<FileAssembler>,
    dirs: DirectoryAssembler,
    default_policy: LifetimePolicy,
}

impl ObjectStore {
    /// Open the store: creates the cache directory, bootstraps the state
    /// database, and wires the transfer pipeline onto the given ledger.
    pub async fn open(config: StoreConfig, ledger: Arc<dyn Ledger>) -> StoreResult<Self> {
        let state = Arc::new(StateStore::open(&config.db_url).await?);
        let cache = ChunkCache::open(&config.cache_dir).await?;
        let transfer = Arc::new(ChunkTransferClient::new(
            state.clone(),
            cache.clone(),
            ledger,
            config.clone(),
        ));
        let assembler = Arc::new(FileAssembler::new(
            state.clone(),
            cache,
            transfer,
            config.clone(),
        ));
        let dirs = DirectoryAssembler::new(assembler.clone(), state.clone());

        tracing::debug!(cache_dir = %config.cache_dir.display(), "object store opened");
        Ok(Self {
            state,
            assembler,
            dirs,
            default_policy: LifetimePolicy::default(),
        })
    }

    /// Store a byte payload; returns its content-derived file id.
    pub async fn put(&self, data: Bytes) -> StoreResult<String> {
        self.put_with_policy(data, &self.default_policy).await
    }

    pub async fn put_with_policy(
        &self,
        data: Bytes,
        policy: &LifetimePolicy,
    ) -> StoreResult<String> {
        Ok(self.assembler.upload_bytes(data, policy).await?)
    }

    /// Store a local file.
    pub async fn put_file(&self, path: impl AsRef<Path>) -> StoreResult<String> {
        Ok(self
            .assembler
            .upload_file(path, &self.default_policy)
            .await?)
    }

    /// Store a local directory tree; returns the directory id.
    pub async fn put_dir(&self, path: impl AsRef<Path>) -> StoreResult<String> {
        Ok(self
            .dirs
            .upload_dir(path.as_ref(), &self.default_policy)
            .await?)
    }

    /// Fetch and reassemble a file by id.
    pub async fn get(&self, id: &str) -> StoreResult<Bytes> {
        Ok(self.assembler.download(id, &self.default_policy).await?)
    }

    /// Fetch a file and materialize it at `path`.
    pub async fn get_to(&self, id: &str, path: impl AsRef<Path>) -> StoreResult<()> {
        Ok(self
            .assembler
            .download_to(id, path, &self.default_policy)
            .await?)
    }

    /// Resolve a slash-separated path beneath a directory id.
    pub async fn resolve(&self, dir_id: &str, path: &str) -> StoreResult<String> {
        Ok(self
            .dirs
            .resolve(dir_id, path, &self.default_policy)
            .await?)
    }

    /// Entries of one directory level.
    pub async fn list(&self, dir_id: &str) -> StoreResult<Vec<DirEntry>> {
        Ok(self.dirs.list(dir_id, &self.default_policy).await?)
    }

    /// Durable transfer status of a chunk; lets callers distinguish FAILED
    /// from still-in-flight.
    pub async fn chunk_status(
        &self,
        id: &str,
    ) -> StoreResult<Option<(UploadStatus, DownloadStatus)>> {
        Ok(self
            .state
            .find_chunk(id)
            .await?
            .map(|r| (r.upload_status, r.download_status)))
    }

    /// Durable transfer status of a file.
    pub async fn file_status(
        &self,
        id: &str,
    ) -> StoreResult<Option<(UploadStatus, FileDownloadStatus)>> {
        Ok(self
            .state
            .find_file(id)
            .await?
            .map(|r| (r.upload_status, r.download_status)))
    }

    pub async fn close(&self) {
        self.state.close().await;
    }
}
