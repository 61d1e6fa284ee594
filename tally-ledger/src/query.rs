use tally_core::AccountId;

/// Filter describing which posting dates to load for an account.
#[derive(Clone, Debug)]
pub struct PostingQuery {
    pub account: AccountId,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl PostingQuery {
    /// All postings of the account in ascending date order.
    pub fn for_account(account: AccountId) -> Self {
        Self {
            account,
            offset: 0,
            limit: None,
        }
    }

    /// Skip the first `offset` postings and return at most `limit`.
    pub fn with_window(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }
}
