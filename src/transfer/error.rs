use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("no ledger candidate matched chunk {0}")]
    ChunkNotFound(String),

    #[error("upload of chunk {0} failed in another task")]
    UploadFailed(String),

    #[error("download of chunk {0} failed in another task")]
    DownloadFailed(String),

    #[error("ledger error: {0}")]
    Ledger(#[from] crate::ledger::LedgerError),

    #[error("cache error: {0}")]
    Cache(#[from] crate::cache::CacheError),

    #[error("state error: {0}")]
    State(#[from] crate::state::StateError),
}

pub type TransferResult<T> = Result<T, TransferError>;
