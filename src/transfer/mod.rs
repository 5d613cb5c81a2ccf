pub mod client;
pub mod error;
pub mod signals;

pub use client::ChunkTransferClient;
pub use error::{TransferError, TransferResult};
pub use signals::CompletionSignals;
