//! Recurring billing windows.
//!
//! A window is a daily time-of-day span (e.g. 09:00 for 12 hours) that recurs
//! on the dates selected by a [`Recurrence`], in an IANA timezone. The
//! [`WindowPartition`] trait is the only thing the cost allocator needs from a
//! window: split usage intervals into the parts inside the window and the
//! parts outside it.
//!
//! [`RecurringWindow`] is the stock implementation. Occurrence windows are
//! built from local wall-clock times, so "Saturdays 09:00–21:00 Europe/London"
//! means 08:00–20:00 UTC in summer and 09:00–21:00 UTC in winter. Local times
//! that fall in a spring-forward gap resolve to the transition instant;
//! ambiguous local times in a fall-back overlap resolve to the earlier instant.

use chrono::{
    DateTime, Datelike, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeDelta,
    TimeZone, Utc, Weekday,
};
use chrono_tz::Tz;
use rrule::RRuleSet;
use serde::{Deserialize, Serialize};

use crate::error::{CostError, Result};
use crate::interval::{UsageInterval, MS_PER_DAY, MS_PER_HOUR, MS_PER_MINUTE, MS_PER_SECOND};
use crate::natural::offset_at;

/// Upper bound on occurrences expanded from an RRULE for one usage interval.
const MAX_RULE_OCCURRENCES: u16 = u16::MAX;

// ── WindowPartition ─────────────────────────────────────────────────────────

/// Usage split against a window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Partition {
    /// Portions inside the window, ordered by begin.
    pub matched: Vec<UsageInterval>,
    /// Portions outside the window, ordered by begin.
    pub unmatched: Vec<UsageInterval>,
}

/// Splits usage intervals into the portions inside and outside a window.
///
/// Implementations must return `matched` and `unmatched` each ordered by begin
/// ascending, disjoint from one another, free of zero-duration intervals, and
/// together covering exactly the union of the input intervals.
pub trait WindowPartition {
    /// Partition `intervals` against the window.
    ///
    /// When `timezone_override` is given, the window is evaluated in that IANA
    /// timezone instead of its own.
    fn partition(
        &self,
        intervals: &[UsageInterval],
        timezone_override: Option<&str>,
    ) -> Result<Partition>;

    /// The timezone the window is defined in.
    fn timezone(&self) -> Tz;
}

// ── TimeOfDaySpan ───────────────────────────────────────────────────────────

/// The daily part of a window: a local start time and a length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SpanRecord", into = "SpanRecord")]
pub struct TimeOfDaySpan {
    start_ms: i64,
    duration_ms: i64,
}

/// Wire shape of a [`TimeOfDaySpan`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct SpanRecord {
    #[serde(default)]
    hours: u32,
    #[serde(default)]
    minutes: u32,
    #[serde(default)]
    seconds: u32,
    #[serde(default)]
    milliseconds: u32,
    duration_minutes: u32,
}

impl TryFrom<SpanRecord> for TimeOfDaySpan {
    type Error = CostError;

    fn try_from(r: SpanRecord) -> Result<Self> {
        TimeOfDaySpan::new(r.hours, r.minutes, r.seconds, r.milliseconds, r.duration_minutes)
    }
}

impl From<TimeOfDaySpan> for SpanRecord {
    fn from(span: TimeOfDaySpan) -> Self {
        let start = span.start_ms;
        SpanRecord {
            hours: (start / MS_PER_HOUR) as u32,
            minutes: (start % MS_PER_HOUR / MS_PER_MINUTE) as u32,
            seconds: (start % MS_PER_MINUTE / MS_PER_SECOND) as u32,
            milliseconds: (start % MS_PER_SECOND) as u32,
            duration_minutes: (span.duration_ms / MS_PER_MINUTE) as u32,
        }
    }
}

impl TimeOfDaySpan {
    /// A span starting at local `hours:minutes:seconds.milliseconds` and lasting
    /// `duration_minutes`. The span may run past midnight.
    ///
    /// # Errors
    ///
    /// Returns [`CostError::InvalidDuration`] if the start is not a time of day
    /// or the duration is zero.
    pub fn new(
        hours: u32,
        minutes: u32,
        seconds: u32,
        milliseconds: u32,
        duration_minutes: u32,
    ) -> Result<Self> {
        if hours > 23 || minutes > 59 || seconds > 59 || milliseconds > 999 {
            return Err(CostError::InvalidDuration(format!(
                "start {hours:02}:{minutes:02}:{seconds:02}.{milliseconds:03} is not a time of day"
            )));
        }
        if duration_minutes == 0 {
            return Err(CostError::InvalidDuration(
                "window duration must be positive".to_string(),
            ));
        }
        Ok(TimeOfDaySpan {
            start_ms: i64::from(hours) * MS_PER_HOUR
                + i64::from(minutes) * MS_PER_MINUTE
                + i64::from(seconds) * MS_PER_SECOND
                + i64::from(milliseconds),
            duration_ms: i64::from(duration_minutes) * MS_PER_MINUTE,
        })
    }

    /// Milliseconds after local midnight at which the span starts.
    pub fn start_ms(&self) -> i64 {
        self.start_ms
    }

    pub fn duration_ms(&self) -> i64 {
        self.duration_ms
    }

    fn start_time(&self) -> NaiveTime {
        NaiveTime::MIN + TimeDelta::milliseconds(self.start_ms)
    }
}

// ── Recurrence ──────────────────────────────────────────────────────────────

/// Which local dates a window occurs on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Recurrence {
    /// Every day.
    Daily,
    /// One day of every week.
    DayOfWeek(Weekday),
    /// One day of every month (1–31); months without that day are skipped.
    DayOfMonth(u32),
    /// A single calendar date.
    Date(NaiveDate),
    /// An RFC 5545 RRULE body such as `FREQ=WEEKLY;INTERVAL=2;BYDAY=MO,TH`,
    /// expanded from `dtstart`. As in iCalendar, `dtstart` itself is the
    /// first occurrence.
    ///
    /// The rule only selects dates; the span sets the time of day. Sub-daily
    /// frequencies and `BYHOUR`, `BYMINUTE` or `BYSECOND` are rejected.
    Rule { rrule: String, dtstart: NaiveDate },
}

impl Recurrence {
    /// Whether a date-based recurrence selects `date`. Always false for
    /// [`Recurrence::Rule`], which is expanded instead.
    fn matches(&self, date: NaiveDate) -> bool {
        match self {
            Recurrence::Daily => true,
            Recurrence::DayOfWeek(weekday) => date.weekday() == *weekday,
            Recurrence::DayOfMonth(day) => date.day() == *day,
            Recurrence::Date(only) => date == *only,
            Recurrence::Rule { .. } => false,
        }
    }
}

// ── RecurringWindow ─────────────────────────────────────────────────────────

/// A daily span repeated on the dates chosen by a recurrence, in one timezone.
#[derive(Debug, Clone, PartialEq)]
pub struct RecurringWindow {
    span: TimeOfDaySpan,
    recurrence: Recurrence,
    tz: Tz,
}

impl RecurringWindow {
    /// Build a window.
    ///
    /// # Errors
    ///
    /// Returns [`CostError::InvalidTimezone`] for an unknown IANA name and
    /// [`CostError::InvalidRule`] for a day of month outside 1–31, an RRULE
    /// the `rrule` crate rejects, or an RRULE with sub-daily parts.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::Weekday;
    /// use cost_engine::{Recurrence, RecurringWindow, TimeOfDaySpan};
    ///
    /// let saturdays = RecurringWindow::new(
    ///     TimeOfDaySpan::new(9, 0, 0, 0, 12 * 60).unwrap(),
    ///     Recurrence::DayOfWeek(Weekday::Sat),
    ///     "Europe/London",
    /// )
    /// .unwrap();
    /// assert_eq!(saturdays.span().duration_ms(), 12 * 3_600_000);
    /// ```
    pub fn new(span: TimeOfDaySpan, recurrence: Recurrence, timezone: &str) -> Result<Self> {
        let tz = parse_timezone(timezone)?;
        match &recurrence {
            Recurrence::DayOfMonth(day) if !(1..=31).contains(day) => {
                return Err(CostError::InvalidRule(format!(
                    "day of month {day} is outside 1..=31"
                )));
            }
            Recurrence::Rule { rrule, dtstart } => {
                reject_sub_daily(rrule)?;
                parse_rule_set(rrule, *dtstart, span.start_time(), &tz)?;
            }
            _ => {}
        }
        Ok(RecurringWindow {
            span,
            recurrence,
            tz,
        })
    }

    pub fn span(&self) -> &TimeOfDaySpan {
        &self.span
    }

    pub fn recurrence(&self) -> &Recurrence {
        &self.recurrence
    }

    /// Occurrence windows in `tz` that can overlap `interval`, merged and sorted.
    fn windows_over(
        &self,
        interval: &UsageInterval,
        tz: &Tz,
    ) -> Result<Vec<(DateTime<Utc>, DateTime<Utc>)>> {
        let reach_ms = self.span.start_ms + self.span.duration_ms;
        let local_begin = interval.begin().with_timezone(tz).naive_local();
        let local_end = interval.end().with_timezone(tz).naive_local();
        let first_date = shift_local(local_begin, -reach_ms)?
            .date()
            .pred_opt()
            .ok_or_else(|| out_of_range(local_begin))?;
        let last_date = local_end.date();

        let dates: Vec<NaiveDate> = match &self.recurrence {
            Recurrence::Rule { rrule, dtstart } => {
                expand_rule_dates(rrule, *dtstart, self.span.start_time(), tz, first_date, last_date)?
            }
            recurrence => first_date
                .iter_days()
                .take_while(|date| *date <= last_date)
                .filter(|date| recurrence.matches(*date))
                .collect(),
        };

        let mut windows = Vec::with_capacity(dates.len());
        for date in dates {
            let local_start = shift_local(date.and_time(NaiveTime::MIN), self.span.start_ms)?;
            let local_stop = shift_local(local_start, self.span.duration_ms)?;
            let start = resolve_local(tz, local_start)?;
            let stop = resolve_local(tz, local_stop)?;
            if stop <= start || stop <= interval.begin() || start >= interval.end() {
                continue;
            }
            tracing::trace!(
                date = %date,
                start = %start.to_rfc3339(),
                stop = %stop.to_rfc3339(),
                "occurrence window"
            );
            windows.push((start, stop));
        }

        windows.sort_unstable();
        let mut merged: Vec<(DateTime<Utc>, DateTime<Utc>)> = Vec::with_capacity(windows.len());
        for (start, stop) in windows {
            match merged.last_mut() {
                Some(last) if start <= last.1 => last.1 = last.1.max(stop),
                _ => merged.push((start, stop)),
            }
        }
        Ok(merged)
    }
}

impl WindowPartition for RecurringWindow {
    fn partition(
        &self,
        intervals: &[UsageInterval],
        timezone_override: Option<&str>,
    ) -> Result<Partition> {
        let tz = match timezone_override {
            Some(name) => parse_timezone(name)?,
            None => self.tz,
        };
        for interval in intervals {
            interval.validate()?;
        }

        let mut partition = Partition::default();
        for input in merge_overlapping(intervals)? {
            let mut cursor = input.begin();
            for (start, stop) in self.windows_over(&input, &tz)? {
                let start = start.max(input.begin());
                let stop = stop.min(input.end());
                if start >= stop {
                    continue;
                }
                if start > cursor {
                    partition.unmatched.push(UsageInterval::new(cursor, start)?);
                }
                partition.matched.push(UsageInterval::new(start, stop)?);
                cursor = stop;
            }
            if cursor < input.end() {
                partition.unmatched.push(UsageInterval::new(cursor, input.end())?);
            }
        }

        partition.matched.retain(|span| !span.is_empty());
        partition.unmatched.retain(|span| !span.is_empty());
        Ok(partition)
    }

    fn timezone(&self) -> Tz {
        self.tz
    }
}

// ── Internal helpers ────────────────────────────────────────────────────────

/// Parse an IANA timezone string into `Tz`.
pub(crate) fn parse_timezone(s: &str) -> Result<Tz> {
    s.parse::<Tz>()
        .map_err(|_| CostError::InvalidTimezone(format!("'{}'", s)))
}

/// Sort intervals, drop empty ones, and merge those that strictly overlap.
///
/// Intervals that only touch stay separate.
fn merge_overlapping(intervals: &[UsageInterval]) -> Result<Vec<UsageInterval>> {
    let mut sorted: Vec<UsageInterval> = intervals.iter().copied().filter(|i| !i.is_empty()).collect();
    sorted.sort_unstable();

    let mut merged: Vec<UsageInterval> = Vec::with_capacity(sorted.len());
    for interval in sorted {
        match merged.last_mut() {
            Some(last) if interval.begin() < last.end() => {
                if interval.end() > last.end() {
                    *last = UsageInterval::new(last.begin(), interval.end())?;
                }
            }
            _ => merged.push(interval),
        }
    }
    Ok(merged)
}

/// Map a local wall-clock time to an instant.
///
/// A time inside a spring-forward gap resolves to the transition itself, the
/// first instant after the gap.
fn resolve_local(tz: &Tz, local: NaiveDateTime) -> Result<DateTime<Utc>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => {
            let before = local_offset_ms(tz, shift_local(local, -MS_PER_DAY)?)?;
            let after = local_offset_ms(tz, shift_local(local, MS_PER_DAY)?)?;
            let wall_ms = local.and_utc().timestamp_millis();

            // offset(lo) == before, offset(hi) == after
            let (mut lo, mut hi) = (wall_ms - after, wall_ms - before);
            while hi - lo > 1 {
                let mid = lo + (hi - lo) / 2;
                if offset_at(tz, mid)? == after {
                    hi = mid;
                } else {
                    lo = mid;
                }
            }
            DateTime::from_timestamp_millis(hi).ok_or_else(|| {
                CostError::Expansion(format!("no instant for local time {local} in {}", tz.name()))
            })
        }
    }
}

/// Move a local time by `ms` milliseconds, failing at the edge of the calendar.
fn shift_local(local: NaiveDateTime, ms: i64) -> Result<NaiveDateTime> {
    local
        .checked_add_signed(TimeDelta::milliseconds(ms))
        .ok_or_else(|| out_of_range(local))
}

fn out_of_range(local: NaiveDateTime) -> CostError {
    CostError::Expansion(format!("occurrence windows near {local} are out of range"))
}

/// UTC offset in force at a local time, in milliseconds.
fn local_offset_ms(tz: &Tz, local: NaiveDateTime) -> Result<i64> {
    let offset = tz.offset_from_local_datetime(&local).earliest().ok_or_else(|| {
        CostError::Expansion(format!("no offset for local time {local} in {}", tz.name()))
    })?;
    Ok(i64::from(offset.fix().local_minus_utc()) * MS_PER_SECOND)
}

/// Fail on RRULE parts that select times within a day.
fn reject_sub_daily(rrule: &str) -> Result<()> {
    let body = rrule.trim();
    let body = body.strip_prefix("RRULE:").unwrap_or(body);
    for part in body.split(';') {
        let (key, value) = part.split_once('=').unwrap_or((part, ""));
        let key = key.trim().to_ascii_uppercase();
        let sub_daily = match key.as_str() {
            "FREQ" => matches!(
                value.trim().to_ascii_uppercase().as_str(),
                "HOURLY" | "MINUTELY" | "SECONDLY"
            ),
            "BYHOUR" | "BYMINUTE" | "BYSECOND" => true,
            _ => false,
        };
        if sub_daily {
            return Err(CostError::InvalidRule(format!(
                "'{}': {} selects times within a day; use the window span instead",
                rrule,
                part.trim()
            )));
        }
    }
    Ok(())
}

/// Parse an RRULE body anchored at `dtstart` + `start` local time in `tz`.
fn parse_rule_set(rrule: &str, dtstart: NaiveDate, start: NaiveTime, tz: &Tz) -> Result<RRuleSet> {
    let body = rrule.trim();
    let body = body.strip_prefix("RRULE:").unwrap_or(body);
    let text = format!(
        "DTSTART;TZID={}:{}\nRRULE:{}",
        tz.name(),
        dtstart.and_time(start).format("%Y%m%dT%H%M%S"),
        body
    );
    text.parse::<RRuleSet>()
        .map_err(|e| CostError::InvalidRule(format!("'{}': {}", rrule, e)))
}

/// Local dates in `first..=last` on which an RRULE occurs.
fn expand_rule_dates(
    rrule: &str,
    dtstart: NaiveDate,
    start: NaiveTime,
    tz: &Tz,
    first: NaiveDate,
    last: NaiveDate,
) -> Result<Vec<NaiveDate>> {
    let rule_tz = rrule::Tz::Tz(*tz);
    let after = resolve_local(tz, first.and_time(NaiveTime::MIN))?.with_timezone(&rule_tz);
    let day_after = last
        .succ_opt()
        .ok_or_else(|| out_of_range(last.and_time(NaiveTime::MIN)))?;
    let before = resolve_local(tz, day_after.and_time(NaiveTime::MIN))?.with_timezone(&rule_tz);

    let result = parse_rule_set(rrule, dtstart, start, tz)?
        .after(after)
        .before(before)
        .all(MAX_RULE_OCCURRENCES);
    if result.limited {
        return Err(CostError::Expansion(format!(
            "'{}' produces more than {} occurrences between {} and {}",
            rrule, MAX_RULE_OCCURRENCES, first, last
        )));
    }

    let mut dates: Vec<NaiveDate> = result
        .dates
        .iter()
        .map(|dt| dt.with_timezone(tz).date_naive())
        .filter(|date| (first..=last).contains(date))
        .collect();
    dates.dedup();
    Ok(dates)
}

// ── Tests ───────────────────────────────────────────────────────────────────
