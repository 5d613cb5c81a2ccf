pub mod error;
pub mod store;

pub use error::{CacheError, CacheResult};
pub use store::ChunkCache;
