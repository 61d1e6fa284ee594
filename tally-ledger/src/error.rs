use tally_core::{AccountId, TransactionId};
use thiserror::Error;

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Error type surfaced by ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("invalid ledger state: {0}")]
    InvalidState(String),
    #[error("unknown account {0}")]
    UnknownAccount(AccountId),
    #[error("unknown transaction {0}")]
    UnknownTransaction(TransactionId),
    #[error("account {0} has no commodity")]
    MissingCommodity(AccountId),
}

impl From<rusqlite::Error> for LedgerError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(value: std::io::Error) -> Self {
        Self::Storage(value.to_string())
    }
}
