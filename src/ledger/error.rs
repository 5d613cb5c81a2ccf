use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("submit failed: {0}")]
    Submit(String),

    #[error("tag query failed: {0}")]
    Query(String),

    #[error("fetch failed for transaction {0}")]
    Fetch(String),

    #[error("transaction not found: {0}")]
    NotFound(String),
}

impl LedgerError {
    /// Whether a retry could plausibly succeed. Infrastructure failures are
    /// transient; a missing transaction on a write-once ledger is not.
    pub fn is_transient(&self) -> bool {
        !matches!(self, LedgerError::NotFound(_))
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
