use chrono::{DateTime, Utc};
use tally_core::{time, StartingBalances, TimeSpan};
use tally_ledger::{Account, LedgerSource};
use tracing::debug;

use crate::{CheckpointError, CheckpointResult, CheckpointStore};

/// Computes balances as of a date from checkpoint sums plus the postings
/// that no closed checkpoint covers yet.
#[derive(Clone, Copy, Debug, Default)]
pub struct BalanceResolver;

impl BalanceResolver {
    /// Resolve and store the account's starting balances as of `as_of`.
    /// Dates past the latest sentinel resolve as of the sentinel.
    pub fn resolve<L, S>(
        &self,
        source: &L,
        store: &S,
        account: &mut Account,
        as_of: DateTime<Utc>,
    ) -> CheckpointResult<StartingBalances>
    where
        L: LedgerSource + ?Sized,
        S: CheckpointStore,
    {
        let commodity_id = account
            .commodity
            .clone()
            .ok_or(CheckpointError::MissingCommodity(account.id))?;
        let commodity = source.commodity(&commodity_id)?;

        // the open-ended checkpoint ends at the latest sentinel; past it the
        // final interval would count both as closed and as partial
        let as_of = as_of.min(time::latest());
        let summary = store.summary_before(&account.id, &commodity_id, as_of)?;
        debug!(
            account = %account.id,
            resume_from = %summary.resume_from.to_rfc3339(),
            balance = summary.totals.balance,
            cleared = summary.totals.cleared,
            reconciled = summary.totals.reconciled,
            "checkpoint sums"
        );

        let partial = source.aggregate_postings(
            &account.id,
            &commodity_id,
            TimeSpan::new(summary.resume_from, as_of),
        )?;
        let totals = summary.totals + partial;
        let balances = totals.scaled(commodity.fraction);
        account.set_starting_balances(balances);

        debug!(
            account = %account.id,
            as_of = %as_of.to_rfc3339(),
            balance = %balances.balance,
            cleared = %balances.cleared,
            reconciled = %balances.reconciled,
            "resolved balance"
        );
        Ok(balances)
    }
}
