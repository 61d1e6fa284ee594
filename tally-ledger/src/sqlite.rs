use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tally_core::time::{self, TimeSpan};
use tally_core::{
    AccountId, BalanceTriple, CommodityId, IdParseError, ReconcileState, TransactionId,
};
use tracing::debug;
use uuid::Uuid;

use crate::sql::subtotal_columns;
use crate::{
    Account, Commodity, LedgerError, LedgerResult, LedgerSource, Placement, PostingQuery, Split,
    Transaction,
};

const LEDGER_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS commodities (
    name TEXT PRIMARY KEY,
    fraction INTEGER NOT NULL CHECK (fraction > 0)
);
CREATE TABLE IF NOT EXISTS accounts (
    account_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    commodity TEXT REFERENCES commodities(name),
    parent_id TEXT REFERENCES accounts(account_id)
);
CREATE TABLE IF NOT EXISTS transactions (
    tx_id TEXT PRIMARY KEY,
    date_posted INTEGER NOT NULL,
    description TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS splits (
    split_id TEXT PRIMARY KEY,
    tx_id TEXT NOT NULL REFERENCES transactions(tx_id),
    account_id TEXT NOT NULL REFERENCES accounts(account_id),
    amount INTEGER NOT NULL,
    reconcile TEXT NOT NULL DEFAULT 'n'
);
CREATE INDEX IF NOT EXISTS transactions_idx_date ON transactions(date_posted);
CREATE INDEX IF NOT EXISTS splits_idx_account ON splits(account_id);
CREATE INDEX IF NOT EXISTS splits_idx_tx ON splits(tx_id);
CREATE INDEX IF NOT EXISTS accounts_idx_parent ON accounts(parent_id);
"#;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed ledger book holding commodities, accounts, transactions and splits.
#[derive(Clone, Debug)]
pub struct SqliteLedger {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteLedger {
    pub fn new(path: impl Into<PathBuf>) -> LedgerResult<Self> {
        let ledger = Self {
            path: path.into(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        };
        ledger.initialize_schema()?;
        Ok(ledger)
    }

    /// How long a connection waits on a locked database before failing.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn initialize_schema(&self) -> LedgerResult<()> {
        let conn = self.connect()?;
        conn.execute_batch(LEDGER_SCHEMA)?;
        Ok(())
    }

    /// Open a fresh connection to the book's database file.
    pub fn connect(&self) -> LedgerResult<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL; PRAGMA foreign_keys = ON;",
        )?;
        Ok(conn)
    }

    pub fn add_commodity(&self, commodity: &Commodity) -> LedgerResult<()> {
        if commodity.fraction <= 0 {
            return Err(LedgerError::InvalidState(format!(
                "commodity {} must have a positive fraction, got {}",
                commodity.id, commodity.fraction
            )));
        }
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO commodities (name, fraction) VALUES (?1, ?2)",
            params![commodity.id.as_str(), commodity.fraction],
        )?;
        Ok(())
    }

    pub fn add_account(&self, account: &Account) -> LedgerResult<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO accounts (account_id, name, commodity, parent_id) VALUES (?1, ?2, ?3, ?4)",
            params![
                account.id.to_string(),
                account.name,
                account.commodity.as_ref().map(|c| c.as_str().to_string()),
                account.parent.map(|id| id.to_string()),
            ],
        )?;
        Ok(())
    }

    /// Every account in the book ordered by name.
    pub fn accounts(&self) -> LedgerResult<Vec<Account>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT account_id, name, commodity, parent_id FROM accounts ORDER BY name, account_id",
        )?;
        let mut rows = stmt.query([])?;
        let mut accounts = Vec::new();
        while let Some(row) = rows.next()? {
            accounts.push(row_to_account(row)?);
        }
        Ok(accounts)
    }

    /// Persist a transaction and all of its splits atomically.
    pub fn record_transaction(&self, txn: &Transaction) -> LedgerResult<()> {
        if !TimeSpan::everything().contains(txn.date_posted) {
            return Err(LedgerError::InvalidState(format!(
                "transaction {} posted at {} lies outside {} .. {}",
                txn.id,
                txn.date_posted.to_rfc3339(),
                time::earliest().to_rfc3339(),
                time::latest().to_rfc3339()
            )));
        }
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO transactions (tx_id, date_posted, description) VALUES (?1, ?2, ?3)",
            params![
                txn.id.to_string(),
                time::to_micros(txn.date_posted),
                txn.description
            ],
        )?;
        for split in &txn.splits {
            tx.execute(
                "INSERT INTO splits (split_id, tx_id, account_id, amount, reconcile)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    split.id.to_string(),
                    txn.id.to_string(),
                    split.account.to_string(),
                    split.amount,
                    split.reconcile.as_flag().to_string(),
                ],
            )?;
        }
        tx.commit()?;
        debug!(transaction = %txn.id, splits = txn.splits.len(), "recorded transaction");
        Ok(())
    }

    /// Delete a transaction, returning the placements its splits occupied.
    pub fn remove_transaction(&self, id: &TransactionId) -> LedgerResult<Vec<Placement>> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let placements = {
            let mut stmt = tx.prepare(
                "SELECT DISTINCT s.account_id, t.date_posted
                 FROM splits s JOIN transactions t ON t.tx_id = s.tx_id
                 WHERE s.tx_id = ?1",
            )?;
            let mut rows = stmt.query(params![id.to_string()])?;
            let mut placements = Vec::new();
            while let Some(row) = rows.next()? {
                let account: String = row.get(0)?;
                let date: i64 = row.get(1)?;
                placements.push(Placement::new(parse_id(&account)?, parse_micros(date)?));
            }
            placements
        };
        tx.execute(
            "DELETE FROM splits WHERE tx_id = ?1",
            params![id.to_string()],
        )?;
        let removed = tx.execute(
            "DELETE FROM transactions WHERE tx_id = ?1",
            params![id.to_string()],
        )?;
        if removed == 0 {
            return Err(LedgerError::UnknownTransaction(*id));
        }
        tx.commit()?;
        debug!(transaction = %id, placements = placements.len(), "removed transaction");
        Ok(placements)
    }
}

impl LedgerSource for SqliteLedger {
    fn account(&self, id: &AccountId) -> LedgerResult<Account> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT account_id, name, commodity, parent_id FROM accounts WHERE account_id = ?1",
        )?;
        let mut rows = stmt.query(params![id.to_string()])?;
        match rows.next()? {
            Some(row) => row_to_account(row),
            None => Err(LedgerError::UnknownAccount(*id)),
        }
    }

    fn transaction(&self, id: &TransactionId) -> LedgerResult<Transaction> {
        let conn = self.connect()?;
        let header: Option<(i64, String)> = conn
            .query_row(
                "SELECT date_posted, description FROM transactions WHERE tx_id = ?1",
                params![id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (date_posted, description) = header.ok_or(LedgerError::UnknownTransaction(*id))?;

        let mut stmt = conn.prepare(
            "SELECT split_id, account_id, amount, reconcile FROM splits
             WHERE tx_id = ?1 ORDER BY rowid",
        )?;
        let mut rows = stmt.query(params![id.to_string()])?;
        let mut splits = Vec::new();
        while let Some(row) = rows.next()? {
            splits.push(row_to_split(row)?);
        }
        Ok(Transaction {
            id: *id,
            date_posted: parse_micros(date_posted)?,
            description,
            splits,
        })
    }

    fn commodity(&self, id: &CommodityId) -> LedgerResult<Commodity> {
        let conn = self.connect()?;
        let fraction: Option<i64> = conn
            .query_row(
                "SELECT fraction FROM commodities WHERE name = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let fraction =
            fraction.ok_or_else(|| LedgerError::InvalidState(format!("unknown commodity {id}")))?;
        Ok(Commodity::new(id.clone(), fraction))
    }

    fn group_accounts(&self, parent: Option<&AccountId>) -> LedgerResult<Vec<AccountId>> {
        let Some(parent) = parent else {
            return Ok(self
                .accounts()?
                .into_iter()
                .map(|account| account.id)
                .collect());
        };
        // unknown parents are an error, not an empty group
        self.account(parent)?;
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "WITH RECURSIVE subtree(account_id) AS (
                 SELECT account_id FROM accounts WHERE parent_id = ?1
                 UNION ALL
                 SELECT a.account_id FROM accounts a JOIN subtree st ON a.parent_id = st.account_id
             )
             SELECT a.account_id FROM accounts a JOIN subtree st ON st.account_id = a.account_id
             ORDER BY a.name, a.account_id",
        )?;
        let mut rows = stmt.query(params![parent.to_string()])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            ids.push(parse_id(&id)?);
        }
        Ok(ids)
    }

    fn posting_dates(&self, query: &PostingQuery) -> LedgerResult<Vec<DateTime<Utc>>> {
        let conn = self.connect()?;
        let span = TimeSpan::everything();
        let limit = query.limit.map(|value| value as i64).unwrap_or(-1);
        let mut stmt = conn.prepare(
            "SELECT t.date_posted
             FROM splits s JOIN transactions t ON t.tx_id = s.tx_id
             WHERE s.account_id = ?1 AND t.date_posted >= ?2 AND t.date_posted < ?3
             ORDER BY t.date_posted ASC
             LIMIT ?4 OFFSET ?5",
        )?;
        let mut rows = stmt.query(params![
            query.account.to_string(),
            time::to_micros(span.start),
            time::to_micros(span.end),
            limit,
            query.offset as i64,
        ])?;
        let mut dates = Vec::new();
        while let Some(row) = rows.next()? {
            dates.push(parse_micros(row.get(0)?)?);
        }
        Ok(dates)
    }

    fn aggregate_postings(
        &self,
        account: &AccountId,
        commodity: &CommodityId,
        span: TimeSpan,
    ) -> LedgerResult<BalanceTriple> {
        if span.is_empty() {
            return Ok(BalanceTriple::ZERO);
        }
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {}
             FROM splits s
             JOIN transactions t ON t.tx_id = s.tx_id
             JOIN accounts a ON a.account_id = s.account_id
             WHERE s.account_id = ?1 AND a.commodity = ?2
               AND t.date_posted >= ?3 AND t.date_posted < ?4",
            subtotal_columns()
        );
        let totals = conn.query_row(
            &sql,
            params![
                account.to_string(),
                commodity.as_str(),
                time::to_micros(span.start),
                time::to_micros(span.end),
            ],
            |row| Ok(BalanceTriple::new(row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(totals)
    }
}

/// Parse an identifier column into its typed form.
pub fn parse_id<T>(value: &str) -> LedgerResult<T>
where
    T: FromStr<Err = IdParseError>,
{
    T::from_str(value).map_err(|err| LedgerError::Serialization(err.to_string()))
}

/// Decode a stored microsecond timestamp.
pub fn parse_micros(value: i64) -> LedgerResult<DateTime<Utc>> {
    time::from_micros(value)
        .ok_or_else(|| LedgerError::Serialization(format!("invalid timestamp {value}")))
}

fn row_to_account(row: &rusqlite::Row<'_>) -> LedgerResult<Account> {
    let id: String = row.get(0)?;
    let name: String = row.get(1)?;
    let commodity: Option<String> = row.get(2)?;
    let parent: Option<String> = row.get(3)?;
    Ok(Account {
        id: parse_id(&id)?,
        name,
        commodity: commodity.map(CommodityId::from),
        parent: parent.as_deref().map(parse_id).transpose()?,
        starting_balances: None,
    })
}

fn row_to_split(row: &rusqlite::Row<'_>) -> LedgerResult<Split> {
    let split_id: String = row.get(0)?;
    let account: String = row.get(1)?;
    let amount: i64 = row.get(2)?;
    let flag: String = row.get(3)?;
    let reconcile = ReconcileState::from_str(&flag).map_err(LedgerError::Serialization)?;
    Ok(Split {
        id: Uuid::parse_str(&split_id).map_err(|err| {
            LedgerError::Serialization(format!("invalid split id {split_id}: {err}"))
        })?,
        account: parse_id(&account)?,
        amount,
        reconcile,
    })
}
