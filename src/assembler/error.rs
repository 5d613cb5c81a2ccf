use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssembleError {
    #[error("chunk integrity mismatch: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    #[error("manifest merkle tree mismatch for file {0}")]
    IncorrectMerkleHash(String),

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("transfer error: {0}")]
    Transfer(#[from] crate::transfer::TransferError),

    #[error("state error: {0}")]
    State(#[from] crate::state::StateError),

    #[error("cache error: {0}")]
    Cache(#[from] crate::cache::CacheError),

    #[error("merkle error: {0}")]
    Merkle(#[from] crate::merkle::MerkleError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AssembleResult<T> = Result<T, AssembleError>;
