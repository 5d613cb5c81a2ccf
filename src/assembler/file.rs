//! Splitting files into chunks and putting them back together.
//!
//! Upload: payloads that fit in one chunk are stored raw and the file id is
//! the chunk id; anything larger is split into fixed-size slices, described
//! by a chunk-info manifest, and the file id is the hash of the encoded
//! manifest. Chunk upload order does not matter; chunks shared across files
//! are uploaded once because they are content-addressed.
//!
//! Download runs the path in reverse, sniffing the prologue to tell a raw
//! payload from a manifest, re-verifying the merkle node array before
//! trusting the chunk list, and trimming the final chunk back to the
//! manifest's filesize. A failure marks the file FAILED but leaves completed
//! chunk state in place so a retry skips finished work.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use tokio::fs;

use crate::cache::{CacheError, ChunkCache};
use crate::config::StoreConfig;
use crate::hashing::{digest_to_hex, hex_digest, keccak256, ContentDigest};
use crate::merkle;
use crate::state::{
    FileDownloadStatus, FileRecord, LifetimePolicy, StateStore, UploadStatus, MANIFEST_OFFSET,
};
use crate::transfer::ChunkTransferClient;

use super::error::{AssembleError, AssembleResult};
use super::manifest::ChunkInfoManifest;

pub struct FileAssembler {
    state: Arc<StateStore>,
    cache: ChunkCache,
    transfer: Arc<ChunkTransferClient>,
    config: StoreConfig,
}

impl FileAssembler {
    pub fn new(
        state: Arc<StateStore>,
        cache: ChunkCache,
        transfer: Arc<ChunkTransferClient>,
        config: StoreConfig,
    ) -> Self {
        Self {
            state,
            cache,
            transfer,
            config,
        }
    }

    /// Upload a byte payload; returns the file id.
    pub async fn upload_bytes(
        &self,
        data: Bytes,
        policy: &LifetimePolicy,
    ) -> AssembleResult<String> {
        if data.len() <= self.config.chunk_size {
            self.upload_single(data, policy).await
        } else {
            self.upload_chunked(data, policy).await
        }
    }

    /// Upload a local file, recording its original path for later cache use.
    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        policy: &LifetimePolicy,
    ) -> AssembleResult<String> {
        let path = path.as_ref();
        let data = Bytes::from(fs::read(path).await?);
        let id = self.upload_bytes(data, policy).await?;

        if let Some(mut record) = self.state.find_file(&id).await? {
            record.original_path = Some(path.to_string_lossy().into_owned());
            self.state.save_file(&record).await?;
        }
        Ok(id)
    }

    /// Download and reassemble the file named by `file_id`.
    pub async fn download(&self, file_id: &str, policy: &LifetimePolicy) -> AssembleResult<Bytes> {
        let mut record = self.state.find_or_create_file(file_id, policy).await?;

        if record.download_status == FileDownloadStatus::Downloaded
            && self.config.use_cached_downloads
        {
            self.state.verify_file_chunks(&record).await?;
            match self.cache.read_file(file_id).await {
                Ok(bytes) => return Ok(bytes),
                Err(CacheError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        // The manifest itself is in flight until the first chunk is sniffed
        record.download_status = FileDownloadStatus::DownloadingChunkInfo;
        self.state.save_file(&record).await?;

        match self.reassemble(&mut record, policy).await {
            Ok(bytes) => {
                record.download_status = FileDownloadStatus::Downloaded;
                self.state.save_file(&record).await?;
                Ok(bytes)
            }
            Err(e) => {
                tracing::warn!(file = %file_id, "download failed: {e}");
                record.download_status = FileDownloadStatus::Failed;
                self.state.save_file(&record).await?;
                Err(e)
            }
        }
    }

    /// Download and materialize to a caller-supplied path.
    pub async fn download_to(
        &self,
        file_id: &str,
        path: impl AsRef<Path>,
        policy: &LifetimePolicy,
    ) -> AssembleResult<()> {
        let bytes = self.download(file_id, policy).await?;
        fs::write(path.as_ref(), &bytes).await?;
        Ok(())
    }

    async fn upload_single(&self, data: Bytes, policy: &LifetimePolicy) -> AssembleResult<String> {
        let id = hex_digest(&data);
        let mut record = self.state.find_or_create_file(&id, policy).await?;
        if record.upload_status == UploadStatus::Uploaded {
            return Ok(id);
        }

        record.upload_status = UploadStatus::Uploading;
        self.state.save_file(&record).await?;

        let result: AssembleResult<()> = async {
            let uploaded = self.transfer.upload_chunk(data.clone(), policy).await?;
            if uploaded != id {
                return Err(AssembleError::IntegrityMismatch {
                    expected: id.clone(),
                    actual: uploaded,
                });
            }
            self.state.link_chunk(&id, &id, 0).await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                record.size = Some(data.len() as i64);
                record.chunk_ids = Some(vec![id.clone()]);
                record.upload_status = UploadStatus::Uploaded;
                self.state.save_file(&record).await?;
                Ok(id)
            }
            Err(e) => {
                record.upload_status = UploadStatus::Failed;
                self.state.save_file(&record).await?;
                Err(e)
            }
        }
    }

    async fn upload_chunked(&self, data: Bytes, policy: &LifetimePolicy) -> AssembleResult<String> {
        let chunk_size = self.config.chunk_size;

        let mut slices: Vec<Bytes> = Vec::with_capacity(data.len().div_ceil(chunk_size));
        let mut offset = 0;
        while offset < data.len() {
            let end = (offset + chunk_size).min(data.len());
            slices.push(data.slice(offset..end));
            offset = end;
        }

        let digests: Vec<ContentDigest> = slices.iter().map(|s| keccak256(s)).collect();
        let nodes = merkle::build_tree(&digests)?;
        let manifest = ChunkInfoManifest::new(
            digests.iter().map(digest_to_hex).collect(),
            data.len() as u64,
            nodes.iter().map(digest_to_hex).collect(),
        );
        let encoded = Bytes::from(manifest.encode()?);
        let file_id = hex_digest(&encoded);

        let mut record = self.state.find_or_create_file(&file_id, policy).await?;
        if record.upload_status == UploadStatus::Uploaded {
            return Ok(file_id);
        }

        record.upload_status = UploadStatus::Uploading;
        self.state.save_file(&record).await?;

        let result: AssembleResult<()> = async {
            // Manifest chunk first; its id is the file id by construction
            let uploaded = self.transfer.upload_chunk(encoded.clone(), policy).await?;
            if uploaded != file_id {
                return Err(AssembleError::IntegrityMismatch {
                    expected: file_id.clone(),
                    actual: uploaded,
                });
            }
            self.state
                .link_chunk(&file_id, &file_id, MANIFEST_OFFSET)
                .await?;

            // Data chunks in parallel; order is irrelevant here. The jobs own
            // everything they touch so the spawned futures are `'static`.
            let transfer = self.transfer.clone();
            let policy = *policy;
            let jobs: Vec<(usize, Bytes, String)> = slices
                .iter()
                .enumerate()
                .map(|(i, slice)| (i, slice.clone(), digest_to_hex(&digests[i])))
                .collect();
            let uploads = jobs.into_iter().map(move |(i, slice, expected)| {
                let transfer = transfer.clone();
                async move {
                    let actual = transfer.upload_chunk(slice, &policy).await?;
                    Ok::<(usize, String, String), AssembleError>((i, expected, actual))
                }
            });
            let results: Vec<_> = stream::iter(uploads)
                .buffer_unordered(self.config.max_concurrent_transfers)
                .collect()
                .await;

            for result in results {
                let (i, expected, actual) = result?;
                if actual != expected {
                    // A transfer layer returning a different id than the
                    // precomputed slice hash is a fatal integrity error
                    return Err(AssembleError::IntegrityMismatch { expected, actual });
                }
                self.state
                    .link_chunk(&file_id, &actual, (i * chunk_size) as i64)
                    .await?;
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                record.size = Some(data.len() as i64);
                record.chunk_ids = Some(manifest.chunks.clone());
                record.upload_status = UploadStatus::Uploaded;
                self.state.save_file(&record).await?;
                Ok(file_id)
            }
            Err(e) => {
                record.upload_status = UploadStatus::Failed;
                self.state.save_file(&record).await?;
                Err(e)
            }
        }
    }

    async fn reassemble(
        &self,
        record: &mut FileRecord,
        policy: &LifetimePolicy,
    ) -> AssembleResult<Bytes> {
        let file_id = record.id.clone();
        let first = self.transfer.download_chunk(&file_id, policy).await?;

        if !ChunkInfoManifest::has_prologue(&first) {
            // Raw single-chunk file, no manifest layer
            self.state.link_chunk(&file_id, &file_id, 0).await?;
            record.size = Some(first.len() as i64);
            record.chunk_ids = Some(vec![file_id.clone()]);
            self.cache.write_file(&file_id, &first).await?;
            return Ok(first);
        }

        self.state
            .link_chunk(&file_id, &file_id, MANIFEST_OFFSET)
            .await?;
        let manifest = ChunkInfoManifest::decode(&first)?;

        let leaves = manifest.chunk_digests()?;
        let expected_nodes = manifest.merkle_digests()?;
        if !merkle::verify_nodes(&leaves, &expected_nodes) {
            return Err(AssembleError::IncorrectMerkleHash(file_id));
        }

        record.download_status = FileDownloadStatus::Downloading;
        record.chunk_ids = Some(manifest.chunks.clone());
        self.state.save_file(record).await?;

        let chunk_size = self.config.chunk_size;
        let n = manifest.chunks.len();

        let transfer = self.transfer.clone();
        let fetch_policy = *policy;
        let fetches = manifest
            .chunks
            .clone()
            .into_iter()
            .enumerate()
            .map(move |(i, chunk_id)| {
                let transfer = transfer.clone();
                async move {
                    let bytes = transfer.download_chunk(&chunk_id, &fetch_policy).await?;
                    Ok::<(usize, String, Bytes), AssembleError>((i, chunk_id, bytes))
                }
            });
        let results: Vec<_> = stream::iter(fetches)
            .buffer_unordered(self.config.max_concurrent_transfers)
            .collect()
            .await;

        let mut parts: Vec<Option<Bytes>> = vec![None; n];
        for result in results {
            let (i, chunk_id, bytes) = result?;
            self.state
                .link_chunk(&file_id, &chunk_id, (i * chunk_size) as i64)
                .await?;
            parts[i] = Some(bytes);
        }

        // Reassembly is sequential by index; a padded final chunk is trimmed
        // back to the manifest's filesize
        let filesize = manifest.filesize as usize;
        let mut out = Vec::with_capacity(filesize);
        for (i, part) in parts.into_iter().enumerate() {
            let part = part.ok_or_else(|| {
                AssembleError::InvalidManifest(format!("chunk {i} missing after fetch"))
            })?;
            out.extend_from_slice(&part);
        }

        if out.len() < filesize {
            return Err(AssembleError::InvalidManifest(format!(
                "reassembled {} bytes, manifest claims {filesize}",
                out.len()
            )));
        }
        out.truncate(filesize);

        let bytes = Bytes::from(out);
        record.size = Some(filesize as i64);
        self.cache.write_file(&file_id, &bytes).await?;
        Ok(bytes)
    }
}
