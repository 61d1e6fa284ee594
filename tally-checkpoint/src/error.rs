use tally_core::AccountId;
use tally_ledger::LedgerError;
use thiserror::Error;

/// Result alias for checkpoint operations.
pub type CheckpointResult<T> = Result<T, CheckpointError>;

/// Error type surfaced by checkpoint maintenance and balance resolution.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("account {0} has no commodity")]
    MissingCommodity(AccountId),
    #[error("unknown account {0}")]
    UnknownAccount(AccountId),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("invalid checkpoint configuration: {0}")]
    Config(String),
    #[error("invalid checkpoint plan: {0}")]
    InvalidPlan(String),
    #[error(transparent)]
    Ledger(LedgerError),
}

impl From<LedgerError> for CheckpointError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::MissingCommodity(id) => Self::MissingCommodity(id),
            LedgerError::UnknownAccount(id) => Self::UnknownAccount(id),
            LedgerError::Storage(message) => Self::Storage(message),
            other => Self::Ledger(other),
        }
    }
}

impl From<rusqlite::Error> for CheckpointError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(value.to_string())
    }
}
