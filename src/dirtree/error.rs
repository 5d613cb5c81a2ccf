use thiserror::Error;

#[derive(Error, Debug)]
pub enum DirError {
    #[error("no such entry: {0}")]
    NotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("invalid directory manifest: {0}")]
    InvalidManifest(String),

    #[error("assemble error: {0}")]
    Assemble(#[from] crate::assembler::AssembleError),

    #[error("state error: {0}")]
    State(#[from] crate::state::StateError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DirResult<T> = Result<T, DirError>;
