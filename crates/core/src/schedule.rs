//! Wall-clock aligned run windows.
//!
//! Capture windows sit on a fixed grid anchored at midnight UTC: with a
//! 30 minute period the boundaries are 00:00, 00:30, 01:00, ... A cycle that
//! starts at 10:12:30 runs until 10:30:00.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Timelike, Utc};

use crate::error::ConfigError;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Default capture grid: one snapshot every half hour.
pub const DEFAULT_GRID_PERIOD: Duration = Duration::from_secs(30 * 60);

/// A grid period that fits in a day and divides it evenly, so a boundary
/// always lands on midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GridPeriod(Duration);

impl GridPeriod {
    /// Validate a grid period.
    ///
    /// # Errors
    ///
    /// Returns error if the period is zero, longer than 24 hours, or does not
    /// divide 24 hours evenly.
    pub fn new(period: Duration) -> Result<Self, ConfigError> {
        if period.is_zero() {
            return Err(ConfigError::ZeroGridPeriod);
        }
        if period > DAY {
            return Err(ConfigError::GridPeriodTooLong { period });
        }
        if DAY.as_nanos().checked_rem(period.as_nanos()) != Some(0) {
            return Err(ConfigError::GridPeriodNotDivisor { period });
        }
        Ok(Self(period))
    }

    /// The period as a plain duration.
    #[must_use]
    pub const fn as_duration(self) -> Duration {
        self.0
    }
}

impl Default for GridPeriod {
    fn default() -> Self {
        Self(DEFAULT_GRID_PERIOD)
    }
}

/// Offset of `now` from the preceding UTC midnight.
#[must_use]
pub fn time_of_day(now: DateTime<Utc>) -> Duration {
    let time = now.time();
    Duration::from_secs(u64::from(time.num_seconds_from_midnight()))
        .saturating_add(Duration::from_nanos(u64::from(time.nanosecond())))
}

/// Time left until the next grid boundary after `now`.
///
/// Always in `(0, period]`: at an exact boundary the full period is returned,
/// since the boundary being stood on is not "next".
#[must_use]
pub fn time_until_next_boundary(now: DateTime<Utc>, period: GridPeriod) -> Duration {
    let period_nanos = period.as_duration().as_nanos();
    let into_period = time_of_day(now)
        .as_nanos()
        .checked_rem(period_nanos)
        .unwrap_or(0);
    let remaining = period_nanos.saturating_sub(into_period);

    u64::try_from(remaining).map_or(period.as_duration(), Duration::from_nanos)
}

/// One capture window: starts now, ends on the next grid boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunWindow {
    start: DateTime<Utc>,
    length: Duration,
}

impl RunWindow {
    /// Compute the window beginning at `start`.
    #[must_use]
    pub fn starting_at(start: DateTime<Utc>, period: GridPeriod) -> Self {
        Self {
            start,
            length: time_until_next_boundary(start, period),
        }
    }

    /// When the window (and the capture it names) started.
    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// How long the profiler is asked to run.
    #[must_use]
    pub const fn length(&self) -> Duration {
        self.length
    }

    /// The grid boundary closing the window.
    #[must_use]
    pub fn end(&self) -> DateTime<Utc> {
        TimeDelta::from_std(self.length)
            .ok()
            .and_then(|delta| self.start.checked_add_signed(delta))
            .unwrap_or(self.start)
    }
}
