use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("corrupt state: {0}")]
    Corrupt(String),
}

pub type StateResult<T> = Result<T, StateError>;
