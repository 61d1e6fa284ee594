use chrono::{DateTime, Utc};
use tally_core::{AccountId, TransactionId};
use tally_ledger::Placement;
use tracing::debug;

use crate::{CheckpointResult, CheckpointStore, LockPlan};

/// Re-aggregates the cached sums of already-planned checkpoints in place.
///
/// Boundaries are never moved here. When nothing matches (the account was
/// never rebuilt, for instance) the update is a no-op reporting zero rows.
#[derive(Clone, Copy, Debug, Default)]
pub struct IncrementalUpdater;

impl IncrementalUpdater {
    /// Refresh the checkpoint of `account` whose interval contains `at`.
    pub fn update_at<S>(
        &self,
        store: &S,
        account: &AccountId,
        at: DateTime<Utc>,
    ) -> CheckpointResult<usize>
    where
        S: CheckpointStore,
    {
        let lock = LockPlan::refresh_at(*account, at);
        let rows = store.transact(&lock, |unit| unit.refresh_containing(account, at))?;
        log_refresh(&lock, rows);
        Ok(rows)
    }

    /// Refresh every checkpoint, across all accounts, holding one of the
    /// transaction's postings.
    pub fn update_for_transaction<S>(
        &self,
        store: &S,
        transaction: &TransactionId,
    ) -> CheckpointResult<usize>
    where
        S: CheckpointStore,
    {
        let lock = LockPlan::refresh_transaction(*transaction);
        let rows = store.transact(&lock, |unit| unit.refresh_for_transaction(transaction))?;
        log_refresh(&lock, rows);
        Ok(rows)
    }

    /// Refresh the checkpoints holding each placement in one unit of work.
    /// Returns the refreshed row count per placement.
    pub fn update_placements<S>(
        &self,
        store: &S,
        placements: &[Placement],
    ) -> CheckpointResult<Vec<usize>>
    where
        S: CheckpointStore,
    {
        if placements.is_empty() {
            return Ok(Vec::new());
        }
        let mut accounts: Vec<AccountId> = placements.iter().map(|p| p.account).collect();
        accounts.sort();
        accounts.dedup();
        let lock = LockPlan::refresh_accounts(accounts);
        let rows = store.transact(&lock, |unit| {
            placements
                .iter()
                .map(|placement| unit.refresh_containing(&placement.account, placement.date))
                .collect::<CheckpointResult<Vec<_>>>()
        })?;
        log_refresh(&lock, rows.iter().sum());
        Ok(rows)
    }
}

fn log_refresh(lock: &LockPlan, rows: usize) {
    if rows == 0 {
        debug!(scope = %lock.scope, "no checkpoint matched; rebuild to create one");
    } else {
        debug!(scope = %lock.scope, rows, "refreshed checkpoints");
    }
}
