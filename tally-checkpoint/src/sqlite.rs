use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tally_core::time::{self, TimeSpan};
use tally_core::{AccountId, BalanceTriple, CommodityId, TransactionId};
use tally_ledger::sql::subtotal_columns;
use tally_ledger::{parse_micros, SqliteLedger};
use tracing::trace;

use crate::{
    Checkpoint, CheckpointResult, CheckpointStore, CheckpointSummary, CheckpointUnit, LockPlan,
};

const CHECKPOINT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS checkpoints (
    account_id TEXT NOT NULL REFERENCES accounts(account_id) ON DELETE CASCADE,
    commodity TEXT NOT NULL,
    date_start INTEGER NOT NULL,
    date_end INTEGER NOT NULL,
    balance INTEGER NOT NULL DEFAULT 0,
    cleared_balance INTEGER NOT NULL DEFAULT 0,
    reconciled_balance INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (account_id, date_start, date_end),
    CHECK (date_start < date_end)
);
CREATE INDEX IF NOT EXISTS checkpoints_idx_account_end
    ON checkpoints(account_id, commodity, date_end);
"#;

/// SQLite checkpoint relation living next to the ledger tables it summarizes.
#[derive(Clone, Debug)]
pub struct SqliteCheckpointStore {
    ledger: SqliteLedger,
}

impl SqliteCheckpointStore {
    pub fn new(ledger: SqliteLedger) -> CheckpointResult<Self> {
        let store = Self { ledger };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> CheckpointResult<()> {
        let conn = self.connect()?;
        conn.execute_batch(CHECKPOINT_SCHEMA)?;
        Ok(())
    }

    fn connect(&self) -> CheckpointResult<Connection> {
        Ok(self.ledger.connect()?)
    }
}

impl CheckpointStore for SqliteCheckpointStore {
    fn transact<T, F>(&self, plan: &LockPlan, work: F) -> CheckpointResult<T>
    where
        F: FnOnce(&mut dyn CheckpointUnit) -> CheckpointResult<T>,
    {
        // SQLite locks the whole database: an immediate transaction takes the
        // write lock up front so no other session can touch checkpoints or add
        // splits, while WAL readers keep seeing the last committed state.
        let immediate = plan.requires_write();
        let behavior = if immediate {
            TransactionBehavior::Immediate
        } else {
            TransactionBehavior::Deferred
        };
        trace!(scope = %plan.scope, immediate, "beginning checkpoint unit of work");
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(behavior)?;
        let output = {
            let mut unit = SqliteUnit { conn: &tx };
            work(&mut unit)?
        };
        tx.commit()?;
        Ok(output)
    }

    fn summary_before(
        &self,
        account: &AccountId,
        commodity: &CommodityId,
        as_of: DateTime<Utc>,
    ) -> CheckpointResult<CheckpointSummary> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let as_of_micros = time::to_micros(as_of);
        let totals = tx.query_row(
            "SELECT COALESCE(SUM(balance), 0),
                    COALESCE(SUM(cleared_balance), 0),
                    COALESCE(SUM(reconciled_balance), 0)
             FROM checkpoints
             WHERE account_id = ?1 AND commodity = ?2 AND date_end < ?3",
            params![account.to_string(), commodity.as_str(), as_of_micros],
            |row| Ok(BalanceTriple::new(row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        let latest_start: Option<i64> = tx
            .query_row(
                "SELECT date_start FROM checkpoints
                 WHERE account_id = ?1 AND commodity = ?2 AND date_start < ?3
                 ORDER BY date_start DESC LIMIT 1",
                params![account.to_string(), commodity.as_str(), as_of_micros],
                |row| row.get(0),
            )
            .optional()?;
        tx.commit()?;
        let resume_from = match latest_start {
            Some(micros) => parse_micros(micros)?,
            None => time::earliest(),
        };
        Ok(CheckpointSummary {
            totals,
            resume_from,
        })
    }

    fn checkpoints(&self, account: &AccountId) -> CheckpointResult<Vec<Checkpoint>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT commodity, date_start, date_end, balance, cleared_balance, reconciled_balance
             FROM checkpoints WHERE account_id = ?1 ORDER BY date_start ASC",
        )?;
        let mut rows = stmt.query(params![account.to_string()])?;
        let mut checkpoints = Vec::new();
        while let Some(row) = rows.next()? {
            let commodity: String = row.get(0)?;
            let start: i64 = row.get(1)?;
            let end: i64 = row.get(2)?;
            checkpoints.push(Checkpoint {
                account: *account,
                commodity: CommodityId::from(commodity),
                span: TimeSpan::new(parse_micros(start)?, parse_micros(end)?),
                totals: BalanceTriple::new(row.get(3)?, row.get(4)?, row.get(5)?),
            });
        }
        Ok(checkpoints)
    }
}

struct SqliteUnit<'c> {
    conn: &'c Connection,
}

impl SqliteUnit<'_> {
    fn refresh_where(
        &self,
        predicate: &str,
        args: impl rusqlite::Params,
    ) -> CheckpointResult<usize> {
        let sql = format!(
            "UPDATE checkpoints
             SET (balance, cleared_balance, reconciled_balance) = (
                 SELECT {}
                 FROM splits s JOIN transactions t ON t.tx_id = s.tx_id
                 WHERE s.account_id = checkpoints.account_id
                   AND t.date_posted >= checkpoints.date_start
                   AND t.date_posted < checkpoints.date_end
             )
             WHERE {predicate}",
            subtotal_columns()
        );
        Ok(self.conn.execute(&sql, args)?)
    }
}

impl CheckpointUnit for SqliteUnit<'_> {
    fn delete_account(&mut self, account: &AccountId) -> CheckpointResult<usize> {
        Ok(self.conn.execute(
            "DELETE FROM checkpoints WHERE account_id = ?1",
            params![account.to_string()],
        )?)
    }

    fn insert(&mut self, checkpoint: &Checkpoint) -> CheckpointResult<()> {
        self.conn.execute(
            "INSERT INTO checkpoints (
                account_id, commodity, date_start, date_end,
                balance, cleared_balance, reconciled_balance
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                checkpoint.account.to_string(),
                checkpoint.commodity.as_str(),
                time::to_micros(checkpoint.span.start),
                time::to_micros(checkpoint.span.end),
                checkpoint.totals.balance,
                checkpoint.totals.cleared,
                checkpoint.totals.reconciled,
            ],
        )?;
        Ok(())
    }

    fn refresh_account(&mut self, account: &AccountId) -> CheckpointResult<usize> {
        self.refresh_where("account_id = ?1", params![account.to_string()])
    }

    fn refresh_containing(
        &mut self,
        account: &AccountId,
        at: DateTime<Utc>,
    ) -> CheckpointResult<usize> {
        self.refresh_where(
            "account_id = ?1 AND date_start <= ?2 AND date_end > ?2",
            params![account.to_string(), time::to_micros(at)],
        )
    }

    fn refresh_for_transaction(&mut self, transaction: &TransactionId) -> CheckpointResult<usize> {
        self.refresh_where(
            "EXISTS (
                 SELECT 1 FROM splits ts JOIN transactions tt ON tt.tx_id = ts.tx_id
                 WHERE ts.tx_id = ?1
                   AND ts.account_id = checkpoints.account_id
                   AND checkpoints.date_start <= tt.date_posted
                   AND checkpoints.date_end > tt.date_posted
             )",
            params![transaction.to_string()],
        )
    }
}
