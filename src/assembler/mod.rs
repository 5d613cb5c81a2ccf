pub mod error;
pub mod file;
pub mod manifest;

pub use error::{AssembleError, AssembleResult};
pub use file::FileAssembler;
pub use manifest::{ChunkInfoManifest, MANIFEST_PROLOGUE};
