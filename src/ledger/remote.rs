//! Interface boundary to the external write-once ledger.
//!
//! The store never talks to a concrete network client directly; everything
//! goes through this trait so direct signing, bundler HTTP submission, or an
//! in-memory test double are interchangeable backends. The ledger's own
//! retry and availability semantics stay on the other side of the boundary.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::error::LedgerResult;

/// Transaction id assigned by the ledger on submission.
pub type TxId = String;

/// A name/value tag attached to a submitted blob, queryable later.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Write-once, tag-queryable blob storage.
///
/// `query_by_tag` returns candidates in no guaranteed order and with no
/// authenticity guarantee; callers must verify fetched payloads by
/// recomputing their content hash.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Submit a blob with its tags; returns the assigned transaction id.
    async fn submit(&self, data: Bytes, tags: &[Tag]) -> LedgerResult<TxId>;

    /// All transaction ids carrying the given tag. May be empty.
    async fn query_by_tag(&self, name: &str, value: &str) -> LedgerResult<Vec<TxId>>;

    /// Fetch the payload of one transaction.
    async fn fetch(&self, tx: &TxId) -> LedgerResult<Bytes>;
}
