use chrono::{DateTime, Utc};
use tally_core::{time, AccountId, TimeSpan};
use tally_ledger::{LedgerSource, PostingQuery};
use tracing::debug;

use crate::{CheckpointResult, PlannerConfig};

/// Chooses checkpoint interval boundaries from an account's posting dates.
///
/// Every `min_checkpoint_count` postings the planner looks for a boundary.
/// It compares the candidate posting with the one right after it: when they
/// are at least `min_gap` apart the boundary goes `boundary_offset` past the
/// candidate, otherwise the candidate slides forward one posting at a time.
/// Boundaries therefore never split a burst of near-simultaneous postings.
#[derive(Clone, Copy, Debug, Default)]
pub struct CheckpointPlanner {
    config: PlannerConfig,
}

impl CheckpointPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    /// Plan intervals by probing the ledger two postings at a time.
    pub fn plan<L>(&self, source: &L, account: &AccountId) -> CheckpointResult<Vec<TimeSpan>>
    where
        L: LedgerSource + ?Sized,
    {
        let spans = self.plan_with(|offset| {
            let query = PostingQuery::for_account(*account).with_window(offset, 2);
            let window = source.posting_dates(&query)?;
            Ok(match window.as_slice() {
                [candidate, next] => Some((*candidate, *next)),
                _ => None,
            })
        })?;
        debug!(account = %account, checkpoints = spans.len(), "planned checkpoints");
        Ok(spans)
    }

    /// Plan intervals over posting dates already loaded in ascending order.
    pub fn plan_dates(&self, dates: &[DateTime<Utc>]) -> Vec<TimeSpan> {
        let mut next_pair = |offset: usize| -> CheckpointResult<_> {
            Ok(dates
                .get(offset)
                .copied()
                .zip(dates.get(offset + 1).copied()))
        };
        // the in-memory lookup cannot fail
        self.plan_with(&mut next_pair)
            .unwrap_or_else(|_| vec![TimeSpan::everything()])
    }

    fn plan_with<F>(&self, mut next_pair: F) -> CheckpointResult<Vec<TimeSpan>>
    where
        F: FnMut(usize) -> CheckpointResult<Option<(DateTime<Utc>, DateTime<Utc>)>>,
    {
        let mut spans = Vec::new();
        let mut start = time::earliest();
        let mut target = self.config.min_checkpoint_count;
        while let Some((candidate, next)) = next_pair(target)? {
            if next - candidate >= self.config.min_gap {
                let boundary = candidate + self.config.boundary_offset;
                debug!(
                    offset = target,
                    boundary = %boundary.to_rfc3339(),
                    "closing checkpoint inside quiet gap"
                );
                spans.push(TimeSpan::new(start, boundary));
                start = boundary;
                target += self.config.min_checkpoint_count;
            } else {
                target += 1;
            }
        }
        spans.push(TimeSpan::new(start, time::latest()));
        Ok(spans)
    }
}
