pub mod error;
pub mod memory;
pub mod remote;
pub mod tags;

pub use error::{LedgerError, LedgerResult};
pub use memory::MemoryLedger;
pub use remote::{Ledger, Tag, TxId};
pub use tags::{chunk_tags, versioned_chunk_id, TAG_CHUNK_ID, TAG_CHUNK_ID_VERSIONED};
