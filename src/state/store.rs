//! Durable transfer state backed by SQLite.
//!
//! All chunk/file dedup and idempotent-retry behavior rests on this store:
//! `find_or_create` must converge to one logical row under concurrent
//! callers, which INSERT OR IGNORE against the primary key provides. The
//! file↔chunk relationship lives here as a membership table rather than as
//! references between the entity types themselves.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

use super::error::StateResult;
use super::types::{ChunkRecord, DownloadStatus, FileRecord, LifetimePolicy, UploadStatus};

pub struct StateStore {
    pool: SqlitePool,
}

impl StateStore {
    /// Open the store and bootstrap the schema.
    ///
    /// The pool is pinned to one connection: SQLite serializes writers
    /// anyway, and an in-memory database exists per connection, so a wider
    /// pool would hand callers empty databases.
    pub async fn open(db_url: &str) -> StateResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(db_url)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                size INTEGER,
                upload_status TEXT NOT NULL,
                download_status TEXT NOT NULL,
                redundancy INTEGER NOT NULL,
                expires_at INTEGER,
                autorenew INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                id TEXT PRIMARY KEY,
                original_path TEXT,
                size INTEGER,
                chunk_ids TEXT,
                upload_status TEXT NOT NULL,
                download_status TEXT NOT NULL,
                redundancy INTEGER NOT NULL,
                expires_at INTEGER,
                autorenew INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS file_chunks (
                file_id TEXT NOT NULL,
                chunk_id TEXT NOT NULL,
                byte_offset INTEGER NOT NULL,
                PRIMARY KEY (file_id, chunk_id, byte_offset)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_upload ON chunks(upload_status)")
            .execute(&pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_download ON files(download_status)")
            .execute(&pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_file_chunks_file ON file_chunks(file_id)")
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }

    /// In-memory store for tests and demos.
    pub async fn open_in_memory() -> StateResult<Self> {
        Self::open("sqlite::memory:").await
    }

    pub async fn find_chunk(&self, id: &str) -> StateResult<Option<ChunkRecord>> {
        let row = sqlx::query("SELECT * FROM chunks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| self.chunk_from_row(&row)).transpose()
    }

    /// Get or create the chunk row for `id`. If the row already exists, the
    /// given lifetime policy is merged in (max redundancy, max expiry, OR
    /// autorenew) — every file that references the chunk widens its policy.
    pub async fn find_or_create_chunk(
        &self,
        id: &str,
        policy: &LifetimePolicy,
    ) -> StateResult<ChunkRecord> {
        let fresh = ChunkRecord::new(id.to_string(), *policy);
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO chunks
            (id, size, upload_status, download_status, redundancy, expires_at, autorenew, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&fresh.id)
        .bind(fresh.size)
        .bind(serde_json::to_string(&fresh.upload_status)?)
        .bind(serde_json::to_string(&fresh.download_status)?)
        .bind(fresh.policy.redundancy)
        .bind(fresh.policy.expires_at)
        .bind(fresh.policy.autorenew as i64)
        .bind(fresh.created_at)
        .bind(fresh.updated_at)
        .execute(&self.pool)
        .await?;

        let mut record = self
            .find_chunk(id)
            .await?
            .ok_or_else(|| super::error::StateError::NotFound(id.to_string()))?;

        let merged = {
            let mut p = record.policy;
            p.merge(policy);
            p
        };
        if merged != record.policy {
            record.policy = merged;
            self.save_chunk(&record).await?;
        }

        Ok(record)
    }

    pub async fn save_chunk(&self, record: &ChunkRecord) -> StateResult<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO chunks
            (id, size, upload_status, download_status, redundancy, expires_at, autorenew, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(record.size)
        .bind(serde_json::to_string(&record.upload_status)?)
        .bind(serde_json::to_string(&record.download_status)?)
        .bind(record.policy.redundancy)
        .bind(record.policy.expires_at)
        .bind(record.policy.autorenew as i64)
        .bind(record.created_at)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find_file(&self, id: &str) -> StateResult<Option<FileRecord>> {
        let row = sqlx::query("SELECT * FROM files WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| self.file_from_row(&row)).transpose()
    }

    pub async fn find_or_create_file(
        &self,
        id: &str,
        policy: &LifetimePolicy,
    ) -> StateResult<FileRecord> {
        let fresh = FileRecord::new(id.to_string(), *policy);
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO files
            (id, original_path, size, chunk_ids, upload_status, download_status, redundancy, expires_at, autorenew, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&fresh.id)
        .bind(&fresh.original_path)
        .bind(fresh.size)
        .bind(None::<String>)
        .bind(serde_json::to_string(&fresh.upload_status)?)
        .bind(serde_json::to_string(&fresh.download_status)?)
        .bind(fresh.policy.redundancy)
        .bind(fresh.policy.expires_at)
        .bind(fresh.policy.autorenew as i64)
        .bind(fresh.created_at)
        .bind(fresh.updated_at)
        .execute(&self.pool)
        .await?;

        let mut record = self
            .find_file(id)
            .await?
            .ok_or_else(|| super::error::StateError::NotFound(id.to_string()))?;

        let merged = {
            let mut p = record.policy;
            p.merge(policy);
            p
        };
        if merged != record.policy {
            record.policy = merged;
            self.save_file(&record).await?;
        }

        Ok(record)
    }

    pub async fn save_file(&self, record: &FileRecord) -> StateResult<()> {
        let chunk_ids = record
            .chunk_ids
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO files
            (id, original_path, size, chunk_ids, upload_status, download_status, redundancy, expires_at, autorenew, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.original_path)
        .bind(record.size)
        .bind(chunk_ids)
        .bind(serde_json::to_string(&record.upload_status)?)
        .bind(serde_json::to_string(&record.download_status)?)
        .bind(record.policy.redundancy)
        .bind(record.policy.expires_at)
        .bind(record.policy.autorenew as i64)
        .bind(record.created_at)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Atomically claim the upload of a chunk: CREATED or FAILED becomes
    /// UPLOADING. Returns false when another caller holds the claim or the
    /// chunk is already uploaded — the check-and-set happens inside the
    /// database, so two racing callers cannot both win.
    pub async fn try_claim_chunk_upload(&self, id: &str) -> StateResult<bool> {
        let result = sqlx::query(
            "UPDATE chunks SET upload_status = ?, updated_at = ? WHERE id = ? AND upload_status IN (?, ?)",
        )
        .bind(serde_json::to_string(&UploadStatus::Uploading)?)
        .bind(chrono::Utc::now().timestamp())
        .bind(id)
        .bind(serde_json::to_string(&UploadStatus::Created)?)
        .bind(serde_json::to_string(&UploadStatus::Failed)?)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Atomically claim the download of a chunk. A DOWNLOADED chunk can be
    /// re-claimed (the cache entry may have been lost); a DOWNLOADING one
    /// cannot.
    pub async fn try_claim_chunk_download(&self, id: &str) -> StateResult<bool> {
        let result = sqlx::query(
            "UPDATE chunks SET download_status = ?, updated_at = ? WHERE id = ? AND download_status IN (?, ?, ?)",
        )
        .bind(serde_json::to_string(&DownloadStatus::Downloading)?)
        .bind(chrono::Utc::now().timestamp())
        .bind(id)
        .bind(serde_json::to_string(&DownloadStatus::Created)?)
        .bind(serde_json::to_string(&DownloadStatus::Failed)?)
        .bind(serde_json::to_string(&DownloadStatus::Downloaded)?)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Cross-check a file row against its chunk rows. A file listing chunk
    /// ids with no matching chunk record indicates a corrupt or partially
    /// deleted database, not a recoverable transfer state.
    pub async fn verify_file_chunks(&self, record: &FileRecord) -> StateResult<()> {
        if let Some(chunk_ids) = &record.chunk_ids {
            for chunk_id in chunk_ids {
                if self.find_chunk(chunk_id).await?.is_none() {
                    return Err(super::error::StateError::Corrupt(format!(
                        "file {} lists chunk {chunk_id} with no chunk record",
                        record.id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Record that `chunk_id` belongs to `file_id` at the given byte offset.
    /// Idempotent; the membership row is the only place the relationship is
    /// stored.
    pub async fn link_chunk(
        &self,
        file_id: &str,
        chunk_id: &str,
        byte_offset: i64,
    ) -> StateResult<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO file_chunks (file_id, chunk_id, byte_offset) VALUES (?, ?, ?)",
        )
        .bind(file_id)
        .bind(chunk_id)
        .bind(byte_offset)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All chunk memberships of a file, ordered by byte offset (the manifest
    /// chunk's sentinel offset -1 sorts first).
    pub async fn chunks_of(&self, file_id: &str) -> StateResult<Vec<(String, i64)>> {
        let rows = sqlx::query(
            "SELECT chunk_id, byte_offset FROM file_chunks WHERE file_id = ? ORDER BY byte_offset",
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await?;

        let mut memberships = Vec::with_capacity(rows.len());
        for row in rows {
            memberships.push((row.try_get("chunk_id")?, row.try_get("byte_offset")?));
        }
        Ok(memberships)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn chunk_from_row(&self, row: &sqlx::sqlite::SqliteRow) -> StateResult<ChunkRecord> {
        Ok(ChunkRecord {
            id: row.try_get("id")?,
            size: row.try_get("size")?,
            upload_status: serde_json::from_str(&row.try_get::<String, _>("upload_status")?)?,
            download_status: serde_json::from_str(&row.try_get::<String, _>("download_status")?)?,
            policy: LifetimePolicy {
                redundancy: row.try_get("redundancy")?,
                expires_at: row.try_get("expires_at")?,
                autorenew: row.try_get::<i64, _>("autorenew")? != 0,
            },
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn file_from_row(&self, row: &sqlx::sqlite::SqliteRow) -> StateResult<FileRecord> {
        let chunk_ids: Option<String> = row.try_get("chunk_ids")?;
        Ok(FileRecord {
            id: row.try_get("id")?,
            original_path: row.try_get("original_path")?,
            size: row.try_get("size")?,
            chunk_ids: chunk_ids.map(|s| serde_json::from_str(&s)).transpose()?,
            upload_status: serde_json::from_str(&row.try_get::<String, _>("upload_status")?)?,
            download_status: serde_json::from_str(&row.try_get::<String, _>("download_status")?)?,
            policy: LifetimePolicy {
                redundancy: row.try_get("redundancy")?,
                expires_at: row.try_get("expires_at")?,
                autorenew: row.try_get::<i64, _>("autorenew")? != 0,
            },
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
