pub mod error;
pub mod store;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::{
    ChunkRecord, DownloadStatus, FileDownloadStatus, FileRecord, LifetimePolicy, UploadStatus,
    MANIFEST_OFFSET,
};
