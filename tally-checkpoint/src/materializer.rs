use tally_core::{AccountId, CommodityId, TimeSpan};
use tracing::info;

use crate::{validate_partition, Checkpoint, CheckpointResult, CheckpointStore, LockPlan};

/// Replaces an account's checkpoint set with a planned one and fills in the
/// cached sums, all inside a single unit of work.
#[derive(Clone, Copy, Debug, Default)]
pub struct CheckpointMaterializer;

impl CheckpointMaterializer {
    /// Returns the number of checkpoints written.
    pub fn materialize<S>(
        &self,
        store: &S,
        account: &AccountId,
        commodity: &CommodityId,
        plan: &[TimeSpan],
    ) -> CheckpointResult<usize>
    where
        S: CheckpointStore,
    {
        validate_partition(plan)?;
        let lock = LockPlan::rebuild(*account);
        let (removed, filled) = store.transact(&lock, |unit| {
            let removed = unit.delete_account(account)?;
            for span in plan {
                unit.insert(&Checkpoint::empty(*account, commodity.clone(), *span))?;
            }
            let filled = unit.refresh_account(account)?;
            Ok((removed, filled))
        })?;
        info!(
            account = %account,
            commodity = %commodity,
            removed,
            checkpoints = filled,
            "rebuilt checkpoints"
        );
        Ok(filled)
    }
}
