pub mod error;
pub mod tree;
pub mod types;

pub use error::{DirError, DirResult};
pub use tree::DirectoryAssembler;
pub use types::{DirEntry, DirManifest, EntryKind};
