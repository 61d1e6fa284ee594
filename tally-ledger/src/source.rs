use chrono::{DateTime, Utc};
use tally_core::{AccountId, BalanceTriple, CommodityId, TimeSpan, TransactionId};

use crate::{Account, Commodity, LedgerError, LedgerResult, PostingQuery, Transaction};

/// Read-only view of the ledger consumed by checkpoint maintenance.
pub trait LedgerSource: Send + Sync {
    /// Look up a single account.
    fn account(&self, id: &AccountId) -> LedgerResult<Account>;

    /// Look up a single transaction with its splits.
    fn transaction(&self, id: &TransactionId) -> LedgerResult<Transaction>;

    /// Look up a commodity by unique name.
    fn commodity(&self, id: &CommodityId) -> LedgerResult<Commodity>;

    /// Resolve the commodity an account is currently denominated in.
    fn account_commodity(&self, id: &AccountId) -> LedgerResult<Commodity> {
        let account = self.account(id)?;
        let commodity = account
            .commodity
            .ok_or(LedgerError::MissingCommodity(account.id))?;
        self.commodity(&commodity)
    }

    /// Every account below `parent`, or every account in the book when `None`.
    fn group_accounts(&self, parent: Option<&AccountId>) -> LedgerResult<Vec<AccountId>>;

    /// Posting dates matching the query, oldest first.
    fn posting_dates(&self, query: &PostingQuery) -> LedgerResult<Vec<DateTime<Utc>>>;

    /// Every posting date of the account, oldest first.
    fn postings_for_account(&self, id: &AccountId) -> LedgerResult<Vec<DateTime<Utc>>> {
        self.posting_dates(&PostingQuery::for_account(*id))
    }

    /// Sum raw, cleared and reconciled deltas of postings inside `span`.
    ///
    /// Implementations aggregate inside the store rather than returning rows.
    fn aggregate_postings(
        &self,
        account: &AccountId,
        commodity: &CommodityId,
        span: TimeSpan,
    ) -> LedgerResult<BalanceTriple>;
}
