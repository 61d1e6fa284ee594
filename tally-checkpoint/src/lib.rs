//! Balance checkpoints: precomputed running sums over contiguous intervals of
//! an account's history, kept current as transactions arrive.
//!
//! A balance as of date `D` is the sum of every checkpoint closed before `D`
//! plus the postings between the start of the checkpoint holding `D` and `D`.

mod checkpoint;
mod config;
mod engine;
mod error;
mod lock;
mod materializer;
mod planner;
mod resolver;
mod sqlite;
mod store;
mod updater;

pub use checkpoint::{validate_partition, Checkpoint, CheckpointSummary};
pub use config::{PlannerConfig, BOUNDARY_OFFSET_SECS, MIN_CHECKPOINT_COUNT, MIN_GAP_SECS};
pub use engine::{CheckpointEngine, GroupRebuild};
pub use error::{CheckpointError, CheckpointResult};
pub use lock::{LockMode, LockPlan, LockRequest, LockScope, Relation};
pub use materializer::CheckpointMaterializer;
pub use planner::CheckpointPlanner;
pub use resolver::BalanceResolver;
pub use sqlite::SqliteCheckpointStore;
pub use store::{CheckpointStore, CheckpointUnit};
pub use updater::IncrementalUpdater;

/// Engine over the SQLite book and the checkpoint table stored alongside it.
pub type SqliteCheckpointEngine =
    CheckpointEngine<tally_ledger::SqliteLedger, SqliteCheckpointStore>;

/// Open the SQLite checkpoint engine for a ledger book.
pub fn open_sqlite(
    ledger: tally_ledger::SqliteLedger,
    config: PlannerConfig,
) -> CheckpointResult<SqliteCheckpointEngine> {
    let store = SqliteCheckpointStore::new(ledger.clone())?;
    CheckpointEngine::new(ledger, store, config)
}
