//! In-process ledger used by tests and the demo binary.
//!
//! Transactions are kept in insertion order so tag queries return candidates
//! oldest-first, which lets tests pin down the "first matching hash wins"
//! download behavior. Submit faults can be injected to exercise the retry
//! path.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use super::error::{LedgerError, LedgerResult};
use super::remote::{Ledger, Tag, TxId};

struct TxEntry {
    tx: TxId,
    data: Bytes,
    tags: Vec<Tag>,
}

#[derive(Default)]
pub struct MemoryLedger {
    entries: RwLock<Vec<TxEntry>>,
    next_tx: AtomicU64,
    submit_faults: AtomicUsize,
    submit_count: AtomicU64,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` submit calls with a transient error.
    pub fn inject_submit_faults(&self, n: usize) {
        self.submit_faults.store(n, Ordering::SeqCst);
    }

    /// Number of submits that reached the ledger (fault-rejected attempts
    /// excluded).
    pub fn accepted_submits(&self) -> u64 {
        self.submit_count.load(Ordering::SeqCst)
    }

    pub fn transaction_count(&self) -> usize {
        self.entries.read().len()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn submit(&self, data: Bytes, tags: &[Tag]) -> LedgerResult<TxId> {
        let faults = self.submit_faults.load(Ordering::SeqCst);
        if faults > 0
            && self
                .submit_faults
                .compare_exchange(faults, faults - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(LedgerError::Submit("injected fault".to_string()));
        }

        let tx = format!("tx-{}", self.next_tx.fetch_add(1, Ordering::SeqCst));
        self.entries.write().push(TxEntry {
            tx: tx.clone(),
            data,
            tags: tags.to_vec(),
        });
        self.submit_count.fetch_add(1, Ordering::SeqCst);
        Ok(tx)
    }

    async fn query_by_tag(&self, name: &str, value: &str) -> LedgerResult<Vec<TxId>> {
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|e| e.tags.iter().any(|t| t.name == name && t.value == value))
            .map(|e| e.tx.clone())
            .collect())
    }

    async fn fetch(&self, tx: &TxId) -> LedgerResult<Bytes> {
        self.entries
            .read()
            .iter()
            .find(|e| &e.tx == tx)
            .map(|e| e.data.clone())
            .ok_or_else(|| LedgerError::NotFound(tx.clone()))
    }
}
