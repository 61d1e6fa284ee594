use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_core::{AccountId, CommodityId, ReconcileState, StartingBalances, TransactionId};
use uuid::Uuid;

/// Currency or security an account is denominated in.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Commodity {
    pub id: CommodityId,
    /// Smallest fraction of one unit; amounts are stored as multiples of `1 / fraction`.
    pub fraction: i64,
}

impl Commodity {
    pub fn new(id: impl Into<CommodityId>, fraction: i64) -> Self {
        Self {
            id: id.into(),
            fraction,
        }
    }
}

/// Account record together with its in-memory starting balances.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub commodity: Option<CommodityId>,
    pub parent: Option<AccountId>,
    #[serde(skip)]
    pub starting_balances: Option<StartingBalances>,
}

impl Account {
    pub fn new(name: impl Into<String>, commodity: Option<CommodityId>) -> Self {
        Self {
            id: AccountId::new(),
            name: name.into(),
            commodity,
            parent: None,
            starting_balances: None,
        }
    }

    pub fn with_parent(mut self, parent: AccountId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn set_starting_balances(&mut self, balances: StartingBalances) {
        self.starting_balances = Some(balances);
    }
}

/// One signed entry of a transaction against a single account.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub id: Uuid,
    pub account: AccountId,
    /// Amount in the account commodity's smallest unit.
    pub amount: i64,
    pub reconcile: ReconcileState,
}

impl Split {
    pub fn new(account: AccountId, amount: i64, reconcile: ReconcileState) -> Self {
        Self {
            id: Uuid::new_v4(),
            account,
            amount,
            reconcile,
        }
    }
}

/// Dated group of splits.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub date_posted: DateTime<Utc>,
    pub description: String,
    pub splits: Vec<Split>,
}

impl Transaction {
    pub fn new(date_posted: DateTime<Utc>, description: impl Into<String>) -> Self {
        Self {
            id: TransactionId::new(),
            date_posted,
            description: description.into(),
            splits: Vec::new(),
        }
    }

    pub fn with_split(
        mut self,
        account: AccountId,
        amount: i64,
        reconcile: ReconcileState,
    ) -> Self {
        self.splits.push(Split::new(account, amount, reconcile));
        self
    }

    /// Every (account, date) position this transaction occupies.
    pub fn placements(&self) -> Vec<Placement> {
        let mut placements: Vec<Placement> = Vec::with_capacity(self.splits.len());
        for split in &self.splits {
            let placement = Placement::new(split.account, self.date_posted);
            if !placements.contains(&placement) {
                placements.push(placement);
            }
        }
        placements
    }
}

/// Position of a posting on an account's timeline.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Placement {
    pub account: AccountId,
    pub date: DateTime<Utc>,
}

impl Placement {
    pub fn new(account: AccountId, date: DateTime<Utc>) -> Self {
        Self { account, date }
    }
}
