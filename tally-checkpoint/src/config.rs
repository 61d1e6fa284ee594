use chrono::Duration;

use crate::{CheckpointError, CheckpointResult};

/// Postings per checkpoint before the planner starts looking for a boundary.
pub const MIN_CHECKPOINT_COUNT: usize = 3;
/// Minimum quiet period between two postings for a boundary to go between them.
pub const MIN_GAP_SECS: i64 = 10;
/// Distance past the candidate posting where the boundary is placed.
pub const BOUNDARY_OFFSET_SECS: i64 = MIN_GAP_SECS / 2;

/// Tunables for checkpoint boundary planning.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PlannerConfig {
    pub min_checkpoint_count: usize,
    pub min_gap: Duration,
    pub boundary_offset: Duration,
}

impl PlannerConfig {
    pub fn new(
        min_checkpoint_count: usize,
        min_gap: Duration,
        boundary_offset: Duration,
    ) -> CheckpointResult<Self> {
        let config = Self {
            min_checkpoint_count,
            min_gap,
            boundary_offset,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_secs(
        min_checkpoint_count: usize,
        min_gap_secs: i64,
        boundary_offset_secs: i64,
    ) -> CheckpointResult<Self> {
        Self::new(
            min_checkpoint_count,
            Duration::seconds(min_gap_secs),
            Duration::seconds(boundary_offset_secs),
        )
    }

    pub fn validate(&self) -> CheckpointResult<()> {
        if self.min_checkpoint_count == 0 {
            return Err(CheckpointError::Config(
                "min_checkpoint_count must be at least 1".into(),
            ));
        }
        if self.min_gap <= Duration::zero() {
            return Err(CheckpointError::Config("min_gap must be positive".into()));
        }
        // the boundary has to land strictly between the two postings of a gap
        if self.boundary_offset <= Duration::zero() || self.boundary_offset >= self.min_gap {
            return Err(CheckpointError::Config(format!(
                "boundary_offset must lie in (0, {}s), got {}s",
                self.min_gap.num_seconds(),
                self.boundary_offset.num_seconds()
            )));
        }
        Ok(())
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            min_checkpoint_count: MIN_CHECKPOINT_COUNT,
            min_gap: Duration::seconds(MIN_GAP_SECS),
            boundary_offset: Duration::seconds(BOUNDARY_OFFSET_SECS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_places_boundary_halfway_into_gap() {
        let config = PlannerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.boundary_offset * 2, config.min_gap);
    }

    #[test]
    fn rejects_offsets_outside_the_gap() {
        assert!(PlannerConfig::from_secs(3, 10, 10).is_err());
        assert!(PlannerConfig::from_secs(3, 10, 0).is_err());
        assert!(PlannerConfig::from_secs(0, 10, 5).is_err());
        assert!(PlannerConfig::from_secs(5, 60, 30).is_ok());
    }
}
