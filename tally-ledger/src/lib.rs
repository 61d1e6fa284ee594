//! Ledger records, the read-only ledger source seen by checkpoint maintenance,
//! and the SQLite book implementing it.

mod error;
mod query;
mod records;
mod source;
pub mod sql;
mod sqlite;

pub use error::{LedgerError, LedgerResult};
pub use query::PostingQuery;
pub use records::{Account, Commodity, Placement, Split, Transaction};
pub use source::LedgerSource;
pub use sqlite::{parse_id, parse_micros, SqliteLedger};
