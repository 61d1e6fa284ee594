//! Timestamp helpers and the sentinel dates bounding every checkpoint set.
//!
//! Timestamps are persisted as signed microseconds since the Unix epoch so
//! that range predicates compare integers in storage.

use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// 1703-01-01T00:00:00Z
pub const EARLIEST_MICROS: i64 = -8_425_728_000 * 1_000_000;
/// 9999-12-31T23:59:59Z
pub const LATEST_MICROS: i64 = 253_402_300_799 * 1_000_000;

static EARLIEST: Lazy<DateTime<Utc>> = Lazy::new(|| from_micros_or_min(EARLIEST_MICROS));
static LATEST: Lazy<DateTime<Utc>> = Lazy::new(|| from_micros_or_max(LATEST_MICROS));

/// Start of the first checkpoint of every account.
pub fn earliest() -> DateTime<Utc> {
    *EARLIEST
}

/// End of the open-ended final checkpoint of every account.
pub fn latest() -> DateTime<Utc> {
    *LATEST
}

pub fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

pub fn from_micros(micros: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_micros(micros).single()
}

fn from_micros_or_min(micros: i64) -> DateTime<Utc> {
    from_micros(micros).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn from_micros_or_max(micros: i64) -> DateTime<Utc> {
    from_micros(micros).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Half-open interval `[start, end)`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TimeSpan {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeSpan {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The span covering all of checkpointed time.
    pub fn everything() -> Self {
        Self::new(earliest(), latest())
    }

    /// Everything from the earliest sentinel up to (excluding) `end`.
    pub fn until(end: DateTime<Utc>) -> Self {
        Self::new(earliest(), end)
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}
