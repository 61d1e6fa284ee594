#![allow(dead_code)]

use anyhow::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tally_checkpoint::{open_sqlite, PlannerConfig, SqliteCheckpointEngine};
use tally_core::{AccountId, CommodityId, ReconcileState};
use tally_ledger::{Account, Commodity, SqliteLedger, Transaction};
use tempfile::TempDir;

pub const USD: &str = "ISO4217::USD";

pub struct Book {
    pub dir: TempDir,
    pub ledger: SqliteLedger,
    pub engine: SqliteCheckpointEngine,
}

impl Book {
    pub fn new(config: PlannerConfig) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let ledger = SqliteLedger::new(dir.path().join("book.db"))?;
        ledger.add_commodity(&Commodity::new(USD, 100))?;
        let engine = open_sqlite(ledger.clone(), config)?;
        Ok(Self {
            dir,
            ledger,
            engine,
        })
    }

    pub fn with_density(count: usize) -> Result<Self> {
        Self::new(PlannerConfig::from_secs(count, 10, 5)?)
    }

    pub fn account(&self, name: &str) -> Result<Account> {
        let account = Account::new(name, Some(CommodityId::from(USD)));
        self.ledger.add_account(&account)?;
        Ok(account)
    }

    /// Record a single-split transaction without touching checkpoints.
    pub fn record(&self, account: AccountId, secs: i64, amount: i64) -> Result<Transaction> {
        self.record_with_state(account, secs, amount, ReconcileState::New)
    }

    pub fn record_with_state(
        &self,
        account: AccountId,
        secs: i64,
        amount: i64,
        state: ReconcileState,
    ) -> Result<Transaction> {
        let txn = Transaction::new(at(secs), "test").with_split(account, amount, state);
        self.ledger.record_transaction(&txn)?;
        Ok(txn)
    }

    /// Record a transaction and run the by-transaction incremental update.
    pub fn post(&self, txn: &Transaction) -> Result<usize> {
        self.ledger.record_transaction(txn)?;
        Ok(self.engine.update_checkpoints_for_transaction(&txn.id)?)
    }
}

pub fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .expect("valid base timestamp")
}

pub fn at(secs: i64) -> DateTime<Utc> {
    base() + Duration::seconds(secs)
}
