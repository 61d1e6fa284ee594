//! Core domain types shared by every Tally crate.

mod amount;
mod ids;
mod reconcile;
pub mod time;

pub use amount::{BalanceTriple, ScaledAmount, StartingBalances};
pub use ids::{AccountId, CommodityId, IdParseError, TransactionId};
pub use reconcile::ReconcileState;
pub use time::TimeSpan;
