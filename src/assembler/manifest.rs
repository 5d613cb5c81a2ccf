//! The "chunk-info" manifest: wire format of a multi-chunk file.
//!
//! On the wire a manifest is the fixed 15-byte prologue followed by UTF-8
//! JSON. The prologue is what lets a downloader decide, with no side
//! information, whether the first chunk it fetched is the whole file or a
//! pointer structure: raw single-chunk payloads never carry it. A file's id
//! is the content hash of this entire encoded document.

use serde::{Deserialize, Serialize};

use crate::hashing::{parse_digest, ContentDigest};

use super::error::{AssembleError, AssembleResult};

/// Fixed magic bytes prefixed to every manifest.
pub const MANIFEST_PROLOGUE: &[u8; 15] = b"weavefile/1:am:";

const MANIFEST_TYPE: &str = "file";
const MANIFEST_HASH_ALG: &str = "keccak256";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkInfoManifest {
    #[serde(rename = "type")]
    pub kind: String,
    /// Ordered constituent chunk ids (file order, never sorted).
    pub chunks: Vec<String>,
    pub hash: String,
    pub filesize: u64,
    /// Full merkle node array over `chunks`, leaves first, root last.
    pub merkle: Vec<String>,
}

impl ChunkInfoManifest {
    pub fn new(chunks: Vec<String>, filesize: u64, merkle: Vec<String>) -> Self {
        Self {
            kind: MANIFEST_TYPE.to_string(),
            chunks,
            hash: MANIFEST_HASH_ALG.to_string(),
            filesize,
            merkle,
        }
    }

    /// Encode as prologue + JSON.
    pub fn encode(&self) -> AssembleResult<Vec<u8>> {
        let mut out = MANIFEST_PROLOGUE.to_vec();
        out.extend_from_slice(&serde_json::to_vec(self)?);
        Ok(out)
    }

    /// Whether a payload starts with the manifest prologue. A consumer must
    /// check this before attempting a JSON parse.
    pub fn has_prologue(data: &[u8]) -> bool {
        data.len() >= MANIFEST_PROLOGUE.len() && data[..MANIFEST_PROLOGUE.len()] == MANIFEST_PROLOGUE[..]
    }

    /// Decode and validate a payload known to carry the prologue. Rejects
    /// unknown document types and hash algorithms.
    pub fn decode(data: &[u8]) -> AssembleResult<Self> {
        if !Self::has_prologue(data) {
            return Err(AssembleError::InvalidManifest(
                "missing manifest prologue".to_string(),
            ));
        }

        let manifest: ChunkInfoManifest =
            serde_json::from_slice(&data[MANIFEST_PROLOGUE.len()..])?;

        if manifest.kind != MANIFEST_TYPE {
            return Err(AssembleError::InvalidManifest(format!(
                "unexpected document type {:?}",
                manifest.kind
            )));
        }
        if manifest.hash != MANIFEST_HASH_ALG {
            return Err(AssembleError::InvalidManifest(format!(
                "unsupported hash algorithm {:?}",
                manifest.hash
            )));
        }
        if manifest.chunks.is_empty() {
            return Err(AssembleError::InvalidManifest(
                "manifest lists no chunks".to_string(),
            ));
        }

        Ok(manifest)
    }

    /// Parse the chunk id list back into digests.
    pub fn chunk_digests(&self) -> AssembleResult<Vec<ContentDigest>> {
        self.chunks
            .iter()
            .map(|id| {
                parse_digest(id)
                    .map_err(|e| AssembleError::InvalidManifest(format!("bad chunk id {id}: {e}")))
            })
            .collect()
    }

    /// Parse the recorded merkle node array back into digests.
    pub fn merkle_digests(&self) -> AssembleResult<Vec<ContentDigest>> {
        self.merkle
            .iter()
            .map(|id| {
                parse_digest(id).map_err(|e| {
                    AssembleError::InvalidManifest(format!("bad merkle node {id}: {e}"))
                })
            })
            .collect()
    }
}
