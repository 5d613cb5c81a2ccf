//! weavestore — content-addressed, chunked object store over a write-once
//! ledger.
//!
//! Files and directory trees are split into fixed-size chunks, identified by
//! the Keccak-256 hash of their bytes, linked into verifiable manifests, and
//! persisted to a tag-queryable remote ledger behind the [`ledger::Ledger`]
//! trait. A local cache and a durable per-chunk/per-file state machine make
//! every transfer idempotent and resumable after a crash.

pub mod assembler;
pub mod cache;
pub mod config;
pub mod dirtree;
pub mod hashing;
pub mod ledger;
pub mod merkle;
pub mod state;
pub mod store;
pub mod transfer;

pub use config::StoreConfig;
pub use state::LifetimePolicy;
pub use store::{ObjectStore, StoreError, StoreResult};
