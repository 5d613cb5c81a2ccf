//! Per-chunk transfer state machine against the remote ledger.
//!
//! Upload and download are driven independently per chunk and must be safe
//! to call twice concurrently for the same id and safe to call again after a
//! process restart. Idempotency comes from the durable status check-and-set,
//! not from a lock: a narrow window where two callers both claim the same
//! chunk is accepted, because content addressing makes both converge on the
//! same bytes.
//!
//! A fetched payload is never trusted without recomputing its content hash;
//! the first candidate whose hash equals the chunk id wins.

use std::future::Future;
use std::sync::Arc;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use bytes::Bytes;

use crate::cache::{CacheError, ChunkCache};
use crate::config::StoreConfig;
use crate::hashing::hex_digest;
use crate::ledger::{chunk_tags, versioned_chunk_id, Ledger, LedgerError, TAG_CHUNK_ID_VERSIONED};
use crate::state::{ChunkRecord, DownloadStatus, LifetimePolicy, StateStore, UploadStatus};

use super::error::{TransferError, TransferResult};
use super::signals::CompletionSignals;

pub struct ChunkTransferClient {
    state: Arc<StateStore>,
    cache: ChunkCache,
    ledger: Arc<dyn Ledger>,
    signals: CompletionSignals,
    config: StoreConfig,
}

impl ChunkTransferClient {
    pub fn new(
        state: Arc<StateStore>,
        cache: ChunkCache,
        ledger: Arc<dyn Ledger>,
        config: StoreConfig,
    ) -> Self {
        Self {
            state,
            cache,
            ledger,
            signals: CompletionSignals::new(),
            config,
        }
    }

    /// Upload one chunk. The chunk id is derived from the bytes, so callers
    /// can verify the returned id against a precomputed hash. Already
    /// uploaded chunks short-circuit without touching the ledger.
    pub async fn upload_chunk(
        &self,
        data: Bytes,
        policy: &LifetimePolicy,
    ) -> TransferResult<String> {
        let id = hex_digest(&data);

        loop {
            let record = self.state.find_or_create_chunk(&id, policy).await?;
            match record.upload_status {
                UploadStatus::Uploaded => return Ok(id),
                UploadStatus::Uploading => {
                    // Another task holds the upload; wait for its terminal
                    // transition instead of polling.
                    match self.wait_upload_terminal(&id).await? {
                        UploadStatus::Uploaded => return Ok(id),
                        _ => return Err(TransferError::UploadFailed(id)),
                    }
                }
                UploadStatus::Created | UploadStatus::Failed => {
                    // The claim is a database check-and-set; a racing caller
                    // loses it and loops back to the wait path.
                    if !self.state.try_claim_chunk_upload(&id).await? {
                        continue;
                    }
                    let mut claimed = record;
                    claimed.upload_status = UploadStatus::Uploading;
                    return self.perform_upload(claimed, data).await;
                }
            }
        }
    }

    async fn perform_upload(
        &self,
        mut record: ChunkRecord,
        data: Bytes,
    ) -> TransferResult<String> {
        let id = record.id.clone();
        let tags = chunk_tags(&id);

        // Once the claim is won, every exit must leave a terminal status
        // behind and wake waiters; otherwise the durable UPLOADING row blocks
        // all later callers.
        let result: TransferResult<()> = async {
            let tx = self
                .with_backoff("submit", || self.ledger.submit(data.clone(), &tags))
                .await?;
            tracing::debug!(chunk = %id, %tx, "chunk submitted to ledger");
            self.cache.write_chunk(&id, &data).await?;
            record.size = Some(data.len() as i64);
            record.upload_status = UploadStatus::Uploaded;
            self.state.save_chunk(&record).await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                self.signals.notify(&id);
                Ok(id)
            }
            Err(e) => {
                self.fail_upload(&mut record).await;
                Err(e)
            }
        }
    }

    /// Record a failed upload and wake waiters. If even the status write
    /// fails, waiters are still woken to re-read.
    async fn fail_upload(&self, record: &mut ChunkRecord) {
        record.upload_status = UploadStatus::Failed;
        if let Err(e) = self.state.save_chunk(record).await {
            tracing::warn!(chunk = %record.id, "could not record failed upload: {e}");
        }
        self.signals.notify(&record.id);
    }

    /// Download one chunk, verifying every candidate payload by content
    /// hash. Serves from the local cache when permitted and already
    /// downloaded.
    pub async fn download_chunk(
        &self,
        id: &str,
        policy: &LifetimePolicy,
    ) -> TransferResult<Bytes> {
        loop {
            let record = self.state.find_or_create_chunk(id, policy).await?;
            match record.download_status {
                DownloadStatus::Downloaded if self.config.use_cached_downloads => {
                    match self.cache.read_chunk(id).await {
                        Ok(bytes) => return Ok(bytes),
                        // Cache entry lost underneath us; fall through and
                        // re-download.
                        Err(CacheError::NotFound(_)) => {}
                        Err(e) => return Err(e.into()),
                    }
                    if !self.state.try_claim_chunk_download(id).await? {
                        continue;
                    }
                    let mut claimed = record;
                    claimed.download_status = DownloadStatus::Downloading;
                    return self.perform_download(claimed).await;
                }
                DownloadStatus::Downloading => {
                    match self.wait_download_terminal(id).await? {
                        DownloadStatus::Downloaded => continue,
                        _ => return Err(TransferError::DownloadFailed(id.to_string())),
                    }
                }
                _ => {
                    if !self.state.try_claim_chunk_download(id).await? {
                        continue;
                    }
                    let mut claimed = record;
                    claimed.download_status = DownloadStatus::Downloading;
                    return self.perform_download(claimed).await;
                }
            }
        }
    }

    async fn perform_download(&self, mut record: ChunkRecord) -> TransferResult<Bytes> {
        // Same boundary as uploads: a won claim must end in a terminal
        // status, whatever goes wrong along the way.
        match self.fetch_verified(&mut record).await {
            Ok(payload) => {
                self.signals.notify(&record.id);
                Ok(payload)
            }
            Err(e) => {
                self.fail_download(&mut record).await;
                Err(e)
            }
        }
    }

    async fn fetch_verified(&self, record: &mut ChunkRecord) -> TransferResult<Bytes> {
        let id = record.id.clone();
        let versioned = versioned_chunk_id(&id);

        let candidates = self
            .with_backoff("query", || {
                self.ledger.query_by_tag(TAG_CHUNK_ID_VERSIONED, &versioned)
            })
            .await?;

        for tx in &candidates {
            let payload = match self.with_backoff("fetch", || self.ledger.fetch(tx)).await {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(chunk = %id, %tx, "candidate fetch failed: {e}");
                    continue;
                }
            };

            if hex_digest(&payload) != id {
                tracing::warn!(chunk = %id, %tx, "candidate hash mismatch, rejecting");
                continue;
            }

            self.cache.write_chunk(&id, &payload).await?;
            record.size = Some(payload.len() as i64);
            record.download_status = DownloadStatus::Downloaded;
            self.state.save_chunk(record).await?;
            return Ok(payload);
        }

        Err(TransferError::ChunkNotFound(id))
    }

    async fn fail_download(&self, record: &mut ChunkRecord) {
        record.download_status = DownloadStatus::Failed;
        if let Err(e) = self.state.save_chunk(record).await {
            tracing::warn!(chunk = %record.id, "could not record failed download: {e}");
        }
        self.signals.notify(&record.id);
    }

    async fn wait_upload_terminal(&self, id: &str) -> TransferResult<UploadStatus> {
        loop {
            let handle = self.signals.handle(id);
            let mut woken = std::pin::pin!(handle.notified());
            // Register before re-reading status, so a transition between the
            // read and the await is not missed.
            woken.as_mut().enable();
            let record = self
                .state
                .find_chunk(id)
                .await?
                .ok_or_else(|| TransferError::UploadFailed(id.to_string()))?;
            if record.upload_status.is_terminal() {
                return Ok(record.upload_status);
            }
            woken.await;
        }
    }

    async fn wait_download_terminal(&self, id: &str) -> TransferResult<DownloadStatus> {
        loop {
            let handle = self.signals.handle(id);
            let mut woken = std::pin::pin!(handle.notified());
            woken.as_mut().enable();
            let record = self
                .state
                .find_chunk(id)
                .await?
                .ok_or_else(|| TransferError::DownloadFailed(id.to_string()))?;
            if record.download_status.is_terminal() {
                return Ok(record.download_status);
            }
            woken.await;
        }
    }

    /// Bounded exponential-backoff retry for transient ledger failures.
    /// Permanent failures (e.g. not-found on a write-once ledger) surface
    /// immediately.
    async fn with_backoff<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let mut backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.config.retry_initial_interval)
            .with_max_interval(self.config.retry_max_interval)
            .with_max_elapsed_time(Some(self.config.retry_max_elapsed))
            .build();

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => match backoff.next_backoff() {
                    Some(delay) => {
                        tracing::warn!("{what} failed, retrying in {:?}: {}", delay, e);
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(e),
                },
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn client_with_ledger(
        temp: &TempDir,
        ledger: Arc<MemoryLedger>,
    ) -> Arc<ChunkTransferClient> {
        let config = StoreConfig {
            cache_dir: temp.path().to_path_buf(),
            retry_initial_interval: Duration::from_millis(1),
            retry_max_interval: Duration::from_millis(5),
            retry_max_elapsed: Duration::from_millis(200),
            ..Default::default()
        };
        let state = Arc::new(StateStore::open_in_memory().await.unwrap());
        let cache = ChunkCache::open(&config.cache_dir).await.unwrap();
        Arc::new(ChunkTransferClient::new(state, cache, ledger, config))
    }

    #[tokio::test]
    async fn test_upload_then_download_round_trip() {
        let temp = TempDir::new().unwrap();
        let ledger = Arc::new(MemoryLedger::new());
        let client = client_with_ledger(&temp, ledger).await;

        let policy = LifetimePolicy::default();
        let data = Bytes::from_static(b"some chunk payload");
        let id = client.upload_chunk(data.clone(), &policy).await.unwrap();
        assert_eq!(id, hex_digest(&data));

        let fetched = client.download_chunk(&id, &policy).await.unwrap();
        assert_eq!(fetched, data);
    }

    #[tokio::test]
    async fn test_second_upload_short_circuits() {
        let temp = TempDir::new().unwrap();
        let ledger = Arc::new(MemoryLedger::new());
        let client = client_with_ledger(&temp, ledger.clone()).await;

        let policy = LifetimePolicy::default();
        let data = Bytes::from_static(b"dedup me");
        let id1 = client.upload_chunk(data.clone(), &policy).await.unwrap();
        let id2 = client.upload_chunk(data, &policy).await.unwrap();

        assert_eq!(id1, id2);
        assert_eq!(ledger.accepted_submits(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_uploads_converge() {
        let temp = TempDir::new().unwrap();
        let ledger = Arc::new(MemoryLedger::new());
        let client = client_with_ledger(&temp, ledger.clone()).await;

        let policy = LifetimePolicy::default();
        let data = Bytes::from_static(b"raced bytes");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let client = client.clone();
            let data = data.clone();
            handles.push(tokio::spawn(async move {
                client.upload_chunk(data, &policy).await.unwrap()
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[0], hex_digest(b"raced bytes"));
    }

    #[tokio::test]
    async fn test_transient_submit_failures_are_retried() {
        let temp = TempDir::new().unwrap();
        let ledger = Arc::new(MemoryLedger::new());
        ledger.inject_submit_faults(2);
        let client = client_with_ledger(&temp, ledger.clone()).await;

        let data = Bytes::from_static(b"flaky network");
        let id = client
            .upload_chunk(data, &LifetimePolicy::default())
            .await
            .unwrap();
        assert_eq!(ledger.accepted_submits(), 1);
        assert_eq!(id, hex_digest(b"flaky network"));
    }

    #[tokio::test]
    async fn test_tampered_candidate_rejected_next_accepted() {
        let temp = TempDir::new().unwrap();
        let ledger = Arc::new(MemoryLedger::new());
        let client = client_with_ledger(&temp, ledger.clone()).await;

        let data = Bytes::from_static(b"authentic bytes");
        let id = hex_digest(&data);

        // A forged blob carrying the chunk's tags lands on the ledger first
        ledger
            .submit(Bytes::from_static(b"forged bytes"), &chunk_tags(&id))
            .await
            .unwrap();
        ledger.submit(data.clone(), &chunk_tags(&id)).await.unwrap();

        let fetched = client
            .download_chunk(&id, &LifetimePolicy::default())
            .await
            .unwrap();
        assert_eq!(fetched, data);
    }

    #[tokio::test]
    async fn test_no_matching_candidate_is_chunk_not_found() {
        let temp = TempDir::new().unwrap();
        let ledger = Arc::new(MemoryLedger::new());
        let client = client_with_ledger(&temp, ledger.clone()).await;

        let id = hex_digest(b"never uploaded");
        // Only a forged candidate exists
        ledger
            .submit(Bytes::from_static(b"wrong"), &chunk_tags(&id))
            .await
            .unwrap();

        let err = client
            .download_chunk(&id, &LifetimePolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::ChunkNotFound(ref i) if *i == id));

        // Status is durably FAILED, distinguishable from in-progress
        let record = client.state.find_chunk(&id).await.unwrap().unwrap();
        assert_eq!(record.download_status, DownloadStatus::Failed);
    }

    #[tokio::test]
    async fn test_cache_failure_marks_upload_failed_and_unblocks() {
        let temp = TempDir::new().unwrap();
        let ledger = Arc::new(MemoryLedger::new());
        let client = client_with_ledger(&temp, ledger).await;

        // Lose the cache directory out from under the client so the
        // post-submit cache write fails
        tokio::fs::remove_dir_all(temp.path()).await.unwrap();

        let data = Bytes::from_static(b"doomed bytes");
        let id = hex_digest(&data);
        let policy = LifetimePolicy::default();
        let err = client.upload_chunk(data.clone(), &policy).await.unwrap_err();
        assert!(matches!(err, TransferError::Cache(_)));

        // The claim must not be left dangling as UPLOADING
        let record = client.state.find_chunk(&id).await.unwrap().unwrap();
        assert_eq!(record.upload_status, UploadStatus::Failed);

        // A later caller re-claims and succeeds once the disk is back
        tokio::fs::create_dir_all(temp.path()).await.unwrap();
        let retried = client.upload_chunk(data, &policy).await.unwrap();
        assert_eq!(retried, id);
    }

    #[tokio::test]
    async fn test_upload_waiter_observes_failed_holder() {
        let temp = TempDir::new().unwrap();
        let ledger = Arc::new(MemoryLedger::new());
        let client = client_with_ledger(&temp, ledger).await;

        let data = Bytes::from_static(b"held elsewhere");
        let id = hex_digest(&data);
        let policy = LifetimePolicy::default();

        // Simulate a holder mid-flight
        let mut record = client.state.find_or_create_chunk(&id, &policy).await.unwrap();
        record.upload_status = UploadStatus::Uploading;
        client.state.save_chunk(&record).await.unwrap();

        let waiter = {
            let client = client.clone();
            let data = data.clone();
            tokio::spawn(async move { client.upload_chunk(data, &policy).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The holder gives up; the waiter must exit with an error, not hang
        record.upload_status = UploadStatus::Failed;
        client.state.save_chunk(&record).await.unwrap();
        client.signals.notify(&id);

        let err = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("waiter must be woken by the failed transition")
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, TransferError::UploadFailed(ref i) if *i == id));
    }

    #[tokio::test]
    async fn test_download_waiter_observes_failed_holder() {
        let temp = TempDir::new().unwrap();
        let ledger = Arc::new(MemoryLedger::new());
        let client = client_with_ledger(&temp, ledger).await;

        let id = hex_digest(b"never arrives");
        let policy = LifetimePolicy::default();

        let mut record = client.state.find_or_create_chunk(&id, &policy).await.unwrap();
        record.download_status = DownloadStatus::Downloading;
        client.state.save_chunk(&record).await.unwrap();

        let waiter = {
            let client = client.clone();
            let id = id.clone();
            tokio::spawn(async move { client.download_chunk(&id, &policy).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        record.download_status = DownloadStatus::Failed;
        client.state.save_chunk(&record).await.unwrap();
        client.signals.notify(&id);

        let err = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("waiter must be woken by the failed transition")
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, TransferError::DownloadFailed(ref i) if *i == id));
    }

    #[tokio::test]
    async fn test_failed_download_can_be_retried() {
        let temp = TempDir::new().unwrap();
        let ledger = Arc::new(MemoryLedger::new());
        let client = client_with_ledger(&temp, ledger.clone()).await;

        let data = Bytes::from_static(b"late arrival");
        let id = hex_digest(&data);
        let policy = LifetimePolicy::default();

        assert!(client.download_chunk(&id, &policy).await.is_err());

        // The bytes appear on the ledger afterwards; a fresh call succeeds
        ledger.submit(data.clone(), &chunk_tags(&id)).await.unwrap();
        let fetched = client.download_chunk(&id, &policy).await.unwrap();
        assert_eq!(fetched, data);
    }
}
