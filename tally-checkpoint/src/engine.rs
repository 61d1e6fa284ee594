use chrono::{DateTime, Utc};
use tally_core::{AccountId, StartingBalances, TransactionId};
use tally_events::{
    CheckpointBus, CheckpointEvent, CheckpointStream, RebuiltEvent, RefreshedEvent,
    TransactionRefreshedEvent,
};
use tally_ledger::{Account, LedgerSource, Placement};
use tracing::warn;

use crate::{
    BalanceResolver, Checkpoint, CheckpointError, CheckpointMaterializer, CheckpointPlanner,
    CheckpointResult, CheckpointStore, IncrementalUpdater, PlannerConfig,
};

/// Outcome of rebuilding every account in a group.
#[derive(Clone, Debug, Default)]
pub struct GroupRebuild {
    pub rebuilt: Vec<(AccountId, usize)>,
    /// Accounts without a commodity; they cannot carry checkpoints.
    pub skipped: Vec<AccountId>,
}

/// Entry point used by the ledger engine: checkpoint maintenance for writers
/// and administrators, balance resolution for readers.
pub struct CheckpointEngine<L, S> {
    source: L,
    store: S,
    planner: CheckpointPlanner,
    materializer: CheckpointMaterializer,
    updater: IncrementalUpdater,
    resolver: BalanceResolver,
    bus: CheckpointBus,
}

impl<L, S> CheckpointEngine<L, S>
where
    L: LedgerSource,
    S: CheckpointStore,
{
    pub fn new(source: L, store: S, config: PlannerConfig) -> CheckpointResult<Self> {
        config.validate()?;
        Ok(Self {
            source,
            store,
            planner: CheckpointPlanner::new(config),
            materializer: CheckpointMaterializer,
            updater: IncrementalUpdater,
            resolver: BalanceResolver,
            bus: CheckpointBus::default(),
        })
    }

    pub fn source(&self) -> &L {
        &self.source
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn subscribe(&self) -> CheckpointStream {
        self.bus.subscribe()
    }

    /// Replace every checkpoint of the account. Returns the new checkpoint count.
    pub fn rebuild_checkpoints(&self, account: &AccountId) -> CheckpointResult<usize> {
        let commodity = self.source.account_commodity(account)?;
        let plan = self.planner.plan(&self.source, account)?;
        let count = self
            .materializer
            .materialize(&self.store, account, &commodity.id, &plan)?;
        self.bus.publish(CheckpointEvent::Rebuilt(RebuiltEvent {
            account: *account,
            checkpoints: count,
        }));
        Ok(count)
    }

    /// Rebuild every account below `parent`, or the whole book when `None`.
    pub fn rebuild_group(&self, parent: Option<&AccountId>) -> CheckpointResult<GroupRebuild> {
        let mut outcome = GroupRebuild::default();
        for account in self.source.group_accounts(parent)? {
            match self.rebuild_checkpoints(&account) {
                Ok(count) => outcome.rebuilt.push((account, count)),
                Err(CheckpointError::MissingCommodity(id)) => {
                    warn!(account = %id, "skipping account without commodity");
                    outcome.skipped.push(id);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(outcome)
    }

    /// Refresh the account's checkpoint containing `at`. Returns refreshed rows.
    pub fn update_checkpoint_at(
        &self,
        account: &AccountId,
        at: DateTime<Utc>,
    ) -> CheckpointResult<usize> {
        let rows = self.updater.update_at(&self.store, account, at)?;
        self.bus.publish(CheckpointEvent::Refreshed(RefreshedEvent {
            account: *account,
            at,
            rows,
        }));
        Ok(rows)
    }

    /// Refresh every checkpoint touched by the transaction's postings.
    pub fn update_checkpoints_for_transaction(
        &self,
        transaction: &TransactionId,
    ) -> CheckpointResult<usize> {
        let rows = self
            .updater
            .update_for_transaction(&self.store, transaction)?;
        self.bus.publish(CheckpointEvent::TransactionRefreshed(
            TransactionRefreshedEvent {
                transaction: *transaction,
                rows,
            },
        ));
        Ok(rows)
    }

    /// Refresh the checkpoints holding postings that moved or disappeared.
    pub fn update_checkpoints_at(&self, placements: &[Placement]) -> CheckpointResult<usize> {
        let rows = self.updater.update_placements(&self.store, placements)?;
        for (placement, refreshed) in placements.iter().zip(&rows) {
            self.bus.publish(CheckpointEvent::Refreshed(RefreshedEvent {
                account: placement.account,
                at: placement.date,
                rows: *refreshed,
            }));
        }
        Ok(rows.iter().sum())
    }

    /// Resolve balances as of `as_of` and write them onto `account`.
    pub fn resolve_balance(
        &self,
        account: &mut Account,
        as_of: DateTime<Utc>,
    ) -> CheckpointResult<StartingBalances> {
        self.resolver
            .resolve(&self.source, &self.store, account, as_of)
    }

    /// Load the account and resolve its balances as of `as_of`.
    pub fn resolve_account(
        &self,
        account: &AccountId,
        as_of: DateTime<Utc>,
    ) -> CheckpointResult<Account> {
        let mut account = self.source.account(account)?;
        self.resolve_balance(&mut account, as_of)?;
        Ok(account)
    }

    /// Resolve every account of a group. Accounts without a commodity are
    /// reported and returned without starting balances.
    pub fn resolve_group_balances(
        &self,
        parent: Option<&AccountId>,
        as_of: DateTime<Utc>,
    ) -> CheckpointResult<Vec<Account>> {
        let mut accounts = Vec::new();
        for id in self.source.group_accounts(parent)? {
            let mut account = self.source.account(&id)?;
            match self.resolve_balance(&mut account, as_of) {
                Ok(_) => {}
                Err(CheckpointError::MissingCommodity(missing)) => {
                    warn!(account = %missing, "account has no commodity; balance not resolved");
                }
                Err(err) => return Err(err),
            }
            accounts.push(account);
        }
        Ok(accounts)
    }

    /// The account's checkpoints ordered by start date.
    pub fn checkpoints(&self, account: &AccountId) -> CheckpointResult<Vec<Checkpoint>> {
        self.store.checkpoints(account)
    }
}
