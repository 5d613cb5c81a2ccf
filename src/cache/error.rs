use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("not found in cache: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;
