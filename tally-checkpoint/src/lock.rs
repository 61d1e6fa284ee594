use std::fmt;

use chrono::{DateTime, Utc};
use tally_core::{AccountId, TransactionId};

/// Relations touched by checkpoint maintenance.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Relation {
    Checkpoints,
    Transactions,
    Splits,
}

/// Access a unit of work requests on a relation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum LockMode {
    /// No other session may write the relation until commit.
    ExclusiveWrite,
    /// Rows may be read but not changed underneath the unit of work.
    SharedRead,
}

/// Rows a unit of work intends to touch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LockScope {
    /// Every checkpoint of one account.
    Account(AccountId),
    /// The checkpoint of one account containing a date.
    Interval {
        account: AccountId,
        at: DateTime<Utc>,
    },
    /// Checkpoints reached through the splits of one transaction.
    Transaction(TransactionId),
    /// Checkpoints containing a set of (account, date) placements.
    Accounts(Vec<AccountId>),
}

impl fmt::Display for LockScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockScope::Account(id) => write!(f, "account {id}"),
            LockScope::Interval { account, at } => {
                write!(f, "account {account} at {}", at.to_rfc3339())
            }
            LockScope::Transaction(id) => write!(f, "transaction {id}"),
            LockScope::Accounts(ids) => write!(f, "{} accounts", ids.len()),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LockRequest {
    pub relation: Relation,
    pub mode: LockMode,
}

impl LockRequest {
    pub fn new(relation: Relation, mode: LockMode) -> Self {
        Self { relation, mode }
    }
}

/// Locking discipline requested by one checkpoint unit of work.
///
/// Stores translate the plan into whatever their engine offers; a store
/// without relation-level locks may take a coarser lock but never a weaker one.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LockPlan {
    pub scope: LockScope,
    pub requests: Vec<LockRequest>,
}

impl LockPlan {
    /// Exclusive checkpoints, shared splits, scoped to an account's whole set.
    pub fn rebuild(account: AccountId) -> Self {
        Self {
            scope: LockScope::Account(account),
            requests: maintenance_requests(false),
        }
    }

    pub fn refresh_at(account: AccountId, at: DateTime<Utc>) -> Self {
        Self {
            scope: LockScope::Interval { account, at },
            requests: maintenance_requests(false),
        }
    }

    /// Also shares the transactions relation, which supplies the posting date.
    pub fn refresh_transaction(transaction: TransactionId) -> Self {
        Self {
            scope: LockScope::Transaction(transaction),
            requests: maintenance_requests(true),
        }
    }

    pub fn refresh_accounts(accounts: Vec<AccountId>) -> Self {
        Self {
            scope: LockScope::Accounts(accounts),
            requests: maintenance_requests(false),
        }
    }

    pub fn mode_for(&self, relation: Relation) -> Option<LockMode> {
        self.requests
            .iter()
            .find(|request| request.relation == relation)
            .map(|request| request.mode)
    }

    /// Whether any relation is requested for exclusive writing.
    pub fn requires_write(&self) -> bool {
        self.requests
            .iter()
            .any(|request| request.mode == LockMode::ExclusiveWrite)
    }
}

fn maintenance_requests(with_transactions: bool) -> Vec<LockRequest> {
    let mut requests = vec![LockRequest::new(
        Relation::Checkpoints,
        LockMode::ExclusiveWrite,
    )];
    if with_transactions {
        requests.push(LockRequest::new(
            Relation::Transactions,
            LockMode::SharedRead,
        ));
    }
    requests.push(LockRequest::new(Relation::Splits, LockMode::SharedRead));
    requests
}
