use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("assemble error: {0}")]
    Assemble(#[from] crate::assembler::AssembleError),

    #[error("directory error: {0}")]
    Dir(#[from] crate::dirtree::DirError),

    #[error("state error: {0}")]
    State(#[from] crate::state::StateError),

    #[error("cache error: {0}")]
    Cache(#[from] crate::cache::CacheError),
}

pub type StoreResult<T> = Result<T, StoreError>;
