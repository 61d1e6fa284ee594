use chrono::{DateTime, Utc};
use serde::Serialize;
use tally_core::{time, AccountId, BalanceTriple, CommodityId, TimeSpan};

use crate::{CheckpointError, CheckpointResult};

/// Cached balance summary of one account over `[span.start, span.end)`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Checkpoint {
    pub account: AccountId,
    pub commodity: CommodityId,
    pub span: TimeSpan,
    pub totals: BalanceTriple,
}

impl Checkpoint {
    /// A planned checkpoint whose sums are still to be filled in.
    pub fn empty(account: AccountId, commodity: CommodityId, span: TimeSpan) -> Self {
        Self {
            account,
            commodity,
            span,
            totals: BalanceTriple::ZERO,
        }
    }

    /// Whether this is the open-ended final checkpoint.
    pub fn is_open_ended(&self) -> bool {
        self.span.end == time::latest()
    }
}

/// Checkpointed portion of a balance as of some date.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CheckpointSummary {
    /// Sums of every checkpoint ending strictly before the as-of date.
    pub totals: BalanceTriple,
    /// Start of the interval the as-of date falls into; postings from here on
    /// are not covered by `totals`.
    pub resume_from: DateTime<Utc>,
}

/// Verify that spans partition the sentinel range without gaps or overlaps.
pub fn validate_partition(spans: &[TimeSpan]) -> CheckpointResult<()> {
    let (Some(first), Some(last)) = (spans.first(), spans.last()) else {
        return Err(CheckpointError::InvalidPlan(
            "no checkpoint intervals".into(),
        ));
    };
    if first.start != time::earliest() {
        return Err(CheckpointError::InvalidPlan(format!(
            "first interval starts at {} instead of the earliest sentinel",
            first.start.to_rfc3339()
        )));
    }
    if last.end != time::latest() {
        return Err(CheckpointError::InvalidPlan(format!(
            "last interval ends at {} instead of the latest sentinel",
            last.end.to_rfc3339()
        )));
    }
    for span in spans {
        if span.is_empty() {
            return Err(CheckpointError::InvalidPlan(format!(
                "empty interval [{}, {})",
                span.start.to_rfc3339(),
                span.end.to_rfc3339()
            )));
        }
    }
    for pair in spans.windows(2) {
        if pair[0].end != pair[1].start {
            return Err(CheckpointError::InvalidPlan(format!(
                "interval ending {} is followed by one starting {}",
                pair[0].end.to_rfc3339(),
                pair[1].start.to_rfc3339()
            )));
        }
    }
    Ok(())
}
