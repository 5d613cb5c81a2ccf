use serde::{Deserialize, Serialize};

/// Byte offset used to link a file's manifest ("chunk-info") chunk to the
/// file in the membership table. Data chunk `i` is linked at
/// `i * chunk_size`; the manifest chunk, whose id equals the file's id, sits
/// at this sentinel instead.
pub const MANIFEST_OFFSET: i64 = -1;

/// Upload progress of a chunk or file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Created,
    Uploading,
    Uploaded,
    Failed,
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Uploaded | UploadStatus::Failed)
    }
}

/// Download progress of a chunk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Created,
    Downloading,
    Downloaded,
    Failed,
}

impl DownloadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadStatus::Downloaded | DownloadStatus::Failed)
    }
}

/// Download progress of a file. Mirrors [`DownloadStatus`] plus the phase
/// where the manifest chunk itself is still in flight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileDownloadStatus {
    Created,
    Downloading,
    DownloadingChunkInfo,
    Downloaded,
    Failed,
}

impl FileDownloadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FileDownloadStatus::Downloaded | FileDownloadStatus::Failed
        )
    }
}

/// Replication/lifetime policy for remote storage. When several files
/// reference the same chunk, the chunk carries the merged policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LifetimePolicy {
    pub redundancy: i64,
    pub expires_at: Option<i64>,
    pub autorenew: bool,
}

impl Default for LifetimePolicy {
    fn default() -> Self {
        Self {
            redundancy: 1,
            expires_at: None,
            autorenew: false,
        }
    }
}

impl LifetimePolicy {
    /// Merge another policy in: max redundancy, max expiry, OR autorenew.
    pub fn merge(&mut self, other: &LifetimePolicy) {
        self.redundancy = self.redundancy.max(other.redundancy);
        self.expires_at = match (self.expires_at, other.expires_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.autorenew |= other.autorenew;
    }
}

/// Durable per-chunk transfer state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub size: Option<i64>,
    pub upload_status: UploadStatus,
    pub download_status: DownloadStatus,
    pub policy: LifetimePolicy,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ChunkRecord {
    pub fn new(id: String, policy: LifetimePolicy) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id,
            size: None,
            upload_status: UploadStatus::Created,
            download_status: DownloadStatus::Created,
            policy,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Durable per-file transfer state. `chunk_ids` is absent until the file has
/// been chunkified (upload) or its manifest parsed (download).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub original_path: Option<String>,
    pub size: Option<i64>,
    pub chunk_ids: Option<Vec<String>>,
    pub upload_status: UploadStatus,
    pub download_status: FileDownloadStatus,
    pub policy: LifetimePolicy,
    pub created_at: i64,
    pub updated_at: i64,
}

impl FileRecord {
    pub fn new(id: String, policy: LifetimePolicy) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id,
            original_path: None,
            size: None,
            chunk_ids: None,
            upload_status: UploadStatus::Created,
            download_status: FileDownloadStatus::Created,
            policy,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_merge() {
        let mut a = LifetimePolicy {
            redundancy: 1,
            expires_at: Some(100),
            autorenew: false,
        };
        let b = LifetimePolicy {
            redundancy: 3,
            expires_at: Some(50),
            autorenew: true,
        };
        a.merge(&b);
        assert_eq!(a.redundancy, 3);
        assert_eq!(a.expires_at, Some(100));
        assert!(a.autorenew);
    }

    #[test]
    fn test_policy_merge_none_expiry() {
        let mut a = LifetimePolicy::default();
        a.merge(&LifetimePolicy {
            redundancy: 1,
            expires_at: Some(42),
            autorenew: false,
        });
        assert_eq!(a.expires_at, Some(42));
    }

    #[test]
    fn test_terminal_states() {
        assert!(UploadStatus::Uploaded.is_terminal());
        assert!(UploadStatus::Failed.is_terminal());
        assert!(!UploadStatus::Uploading.is_terminal());
        assert!(FileDownloadStatus::Failed.is_terminal());
        assert!(!FileDownloadStatus::DownloadingChunkInfo.is_terminal());
    }
}
