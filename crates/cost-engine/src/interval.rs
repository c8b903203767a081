//! Usage intervals: half-open `[begin, end)` spans of resource consumption.
//!
//! An interval is stored as an absolute begin instant plus a whole number of
//! elapsed milliseconds. Every constructor validates its input, and
//! deserialization goes through the same checks, so a [`UsageInterval`] in
//! hand always has a non-negative duration and a representable end.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CostError, Result};

pub const MS_PER_SECOND: i64 = 1_000;
pub const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
pub const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
pub const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

// ── DurationParts ───────────────────────────────────────────────────────────

/// A duration decomposed into calendar-free components.
///
/// Days are always 24 hours here; this is elapsed time, not a wall-clock offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DurationParts {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
    pub milliseconds: i64,
}

impl DurationParts {
    /// Shorthand for a duration of whole minutes.
    pub fn minutes(minutes: i64) -> Self {
        Self {
            minutes,
            ..Default::default()
        }
    }

    /// Total elapsed milliseconds, or `None` on overflow.
    pub fn total_ms(&self) -> Option<i64> {
        let days = self.days.checked_mul(MS_PER_DAY)?;
        let hours = self.hours.checked_mul(MS_PER_HOUR)?;
        let minutes = self.minutes.checked_mul(MS_PER_MINUTE)?;
        let seconds = self.seconds.checked_mul(MS_PER_SECOND)?;
        days.checked_add(hours)?
            .checked_add(minutes)?
            .checked_add(seconds)?
            .checked_add(self.milliseconds)
    }
}

// ── UsageInterval ───────────────────────────────────────────────────────────

/// A continuous half-open span of time during which a resource was used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "IntervalRecord", into = "IntervalRecord")]
pub struct UsageInterval {
    begin: DateTime<Utc>,
    duration_ms: i64,
}

/// Wire shape of a [`UsageInterval`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IntervalRecord {
    begin: DateTime<Utc>,
    duration_ms: i64,
}

impl TryFrom<IntervalRecord> for UsageInterval {
    type Error = CostError;

    fn try_from(record: IntervalRecord) -> Result<Self> {
        UsageInterval::from_millis(record.begin, record.duration_ms)
    }
}

impl From<UsageInterval> for IntervalRecord {
    fn from(interval: UsageInterval) -> Self {
        IntervalRecord {
            begin: interval.begin,
            duration_ms: interval.duration_ms,
        }
    }
}

impl UsageInterval {
    /// Build an interval from its two bounds.
    ///
    /// Sub-millisecond precision in the span length is truncated.
    ///
    /// # Errors
    ///
    /// Returns [`CostError::InvalidArgument`] if `end` is before `begin`.
    pub fn new(begin: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end < begin {
            return Err(CostError::InvalidArgument(format!(
                "interval end {} is before its begin {}",
                end.to_rfc3339(),
                begin.to_rfc3339()
            )));
        }
        Self::from_millis(begin, (end - begin).num_milliseconds())
    }

    /// Build an interval from a begin instant and a decomposed duration.
    ///
    /// # Errors
    ///
    /// Returns [`CostError::InvalidArgument`] if the components overflow, sum to
    /// a negative duration, or push the end past the representable range.
    pub fn with_duration(begin: DateTime<Utc>, duration: DurationParts) -> Result<Self> {
        let total = duration.total_ms().ok_or_else(|| {
            CostError::InvalidArgument(format!("duration overflows: {duration:?}"))
        })?;
        Self::from_millis(begin, total)
    }

    /// Build an interval from a begin instant and elapsed milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`CostError::InvalidArgument`] if `duration_ms` is negative or the
    /// end instant is not representable.
    pub fn from_millis(begin: DateTime<Utc>, duration_ms: i64) -> Result<Self> {
        if duration_ms < 0 {
            return Err(CostError::InvalidArgument(format!(
                "negative interval duration: {duration_ms} ms"
            )));
        }
        let interval = UsageInterval { begin, duration_ms };
        interval.validate()?;
        Ok(interval)
    }

    /// Parse an interval from two RFC 3339 strings.
    ///
    /// # Examples
    ///
    /// ```
    /// use cost_engine::UsageInterval;
    ///
    /// let span = UsageInterval::parse("2017-07-15T12:00:00Z", "2017-07-15T13:30:00Z").unwrap();
    /// assert_eq!(span.duration_ms(), 90 * 60 * 1000);
    /// ```
    pub fn parse(begin: &str, end: &str) -> Result<Self> {
        Self::new(parse_rfc3339(begin)?, parse_rfc3339(end)?)
    }

    pub fn begin(&self) -> DateTime<Utc> {
        self.begin
    }

    /// The exclusive end instant.
    pub fn end(&self) -> DateTime<Utc> {
        self.begin + TimeDelta::milliseconds(self.duration_ms)
    }

    pub fn duration_ms(&self) -> i64 {
        self.duration_ms
    }

    /// True for zero-duration intervals, which every operation ignores.
    pub fn is_empty(&self) -> bool {
        self.duration_ms == 0
    }

    /// Re-check the construction invariants.
    ///
    /// # Errors
    ///
    /// Returns [`CostError::InvalidArgument`] for a negative duration or an end
    /// outside the representable range.
    pub fn validate(&self) -> Result<()> {
        if self.duration_ms < 0 {
            return Err(CostError::InvalidArgument(format!(
                "negative interval duration: {} ms",
                self.duration_ms
            )));
        }
        TimeDelta::try_milliseconds(self.duration_ms)
            .and_then(|delta| self.begin.checked_add_signed(delta))
            .map(|_| ())
            .ok_or_else(|| {
                CostError::InvalidArgument(format!(
                    "interval starting {} with {} ms has no representable end",
                    self.begin.to_rfc3339(),
                    self.duration_ms
                ))
            })
    }
}

/// Parse an RFC 3339 datetime string into `DateTime<Utc>`.
pub(crate) fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CostError::InvalidDatetime(format!("'{}': {}", s, e)))
}

// ── Tests ───────────────────────────────────────────────────────────────────
