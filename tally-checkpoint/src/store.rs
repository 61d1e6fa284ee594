use chrono::{DateTime, Utc};
use tally_core::{AccountId, CommodityId, TransactionId};

use crate::{Checkpoint, CheckpointResult, CheckpointSummary, LockPlan};

/// Mutations available inside one checkpoint unit of work.
///
/// Every refresh recomputes cached sums inside the store; callers never pull
/// postings across the boundary to add them up.
pub trait CheckpointUnit {
    /// Remove every checkpoint of the account, returning how many were deleted.
    fn delete_account(&mut self, account: &AccountId) -> CheckpointResult<usize>;

    /// Insert one checkpoint row.
    fn insert(&mut self, checkpoint: &Checkpoint) -> CheckpointResult<()>;

    /// Re-aggregate every checkpoint of the account.
    fn refresh_account(&mut self, account: &AccountId) -> CheckpointResult<usize>;

    /// Re-aggregate the checkpoint of the account whose interval contains `at`.
    fn refresh_containing(
        &mut self,
        account: &AccountId,
        at: DateTime<Utc>,
    ) -> CheckpointResult<usize>;

    /// Re-aggregate every checkpoint, of any account, containing the posting
    /// date of one of the transaction's splits.
    fn refresh_for_transaction(&mut self, transaction: &TransactionId) -> CheckpointResult<usize>;
}

/// Persisted checkpoint relation.
pub trait CheckpointStore: Send + Sync {
    /// Run `work` as one atomic unit under the requested locks. The unit is
    /// committed when `work` succeeds and rolled back otherwise.
    fn transact<T, F>(&self, plan: &LockPlan, work: F) -> CheckpointResult<T>
    where
        F: FnOnce(&mut dyn CheckpointUnit) -> CheckpointResult<T>;

    /// Checkpoint sums before `as_of` plus the start of the interval holding it,
    /// read from one consistent snapshot.
    fn summary_before(
        &self,
        account: &AccountId,
        commodity: &CommodityId,
        as_of: DateTime<Utc>,
    ) -> CheckpointResult<CheckpointSummary>;

    /// The account's checkpoints ordered by start date.
    fn checkpoints(&self, account: &AccountId) -> CheckpointResult<Vec<Checkpoint>>;
}
