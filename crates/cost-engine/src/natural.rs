//! Natural-unit counting.
//!
//! A natural unit is a clock-aligned bucket in a particular timezone: the
//! minute `14:07`, the hour `14:00–15:00`, or the calendar day
//! `2026-03-29 00:00–24:00`. The cost of a span under a natural policy is the
//! number of distinct buckets it touches, no matter how little of each it uses.
//!
//! Buckets are taken from local wall-clock time, so the count has to follow
//! the UTC offset as it changes inside the span. The span is cut into
//! constant-offset segments, each segment becomes a range of local bucket
//! indices, and the size of the union of those ranges is the answer. This
//! gives:
//!
//! - an end exactly on a boundary does not touch the next bucket;
//! - a wall-clock unit skipped by a spring-forward transition is never counted;
//! - a wall-clock unit repeated by a fall-back transition is counted once;
//! - half-hour and quarter-hour offsets (`Asia/Kolkata`, `Asia/Kathmandu`)
//!   align buckets to the local clock, not to UTC.

use chrono::{DateTime, Offset, TimeZone};
use chrono_tz::Tz;

use crate::error::{CostError, Result};
use crate::interval::{UsageInterval, MS_PER_DAY, MS_PER_HOUR, MS_PER_SECOND};
use crate::rate::RateUnit;

/// Offsets are sampled this far apart when looking for transitions.
const PROBE_STEP_MS: i64 = 6 * MS_PER_HOUR;

/// A run of the span during which the UTC offset is constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OffsetSegment {
    start_ms: i64,
    end_ms: i64,
    offset_ms: i64,
}

/// Count the distinct local wall-clock `unit` buckets that `interval` touches in `tz`.
///
/// Zero-duration intervals touch nothing.
///
/// # Errors
///
/// Returns [`CostError::Expansion`] if an instant inside the interval cannot be
/// mapped into `tz`.
///
/// # Examples
///
/// ```
/// use cost_engine::{natural_unit_count, RateUnit, UsageInterval};
///
/// // 12:01:02.300 – 13:11:02.300 touches the 12:00 and 13:00 clock-hours.
/// let span = UsageInterval::parse("2017-07-15T12:01:02.300Z", "2017-07-15T13:11:02.300Z").unwrap();
/// assert_eq!(natural_unit_count(&span, RateUnit::Hour, &chrono_tz::UTC).unwrap(), 2);
/// ```
pub fn natural_unit_count(interval: &UsageInterval, unit: RateUnit, tz: &Tz) -> Result<u64> {
    if interval.is_empty() {
        return Ok(0);
    }
    let bucket_ms = unit.fixed_ms().unwrap_or(MS_PER_DAY);
    let begin_ms = interval.begin().timestamp_millis();
    let end_ms = interval.end().timestamp_millis();

    let mut ranges: Vec<(i64, i64)> = offset_segments(tz, begin_ms, end_ms)?
        .into_iter()
        .map(|segment| {
            let first = (segment.start_ms + segment.offset_ms).div_euclid(bucket_ms);
            let last = (segment.end_ms - 1 + segment.offset_ms).div_euclid(bucket_ms);
            (first, last)
        })
        .collect();
    ranges.sort_unstable();

    let mut count: i64 = 0;
    let mut covered_through: Option<i64> = None;
    for (first, last) in ranges {
        let from = match covered_through {
            Some(covered) => first.max(covered + 1),
            None => first,
        };
        if last >= from {
            count += last - from + 1;
        }
        covered_through = Some(covered_through.map_or(last, |covered| covered.max(last)));
    }
    Ok(count as u64)
}

/// Split `[begin_ms, end_ms)` into runs of constant UTC offset in `tz`.
fn offset_segments(tz: &Tz, begin_ms: i64, end_ms: i64) -> Result<Vec<OffsetSegment>> {
    let last_ms = end_ms - 1;
    let mut segments = Vec::new();
    let mut segment_start = begin_ms;
    let mut segment_offset = offset_at(tz, begin_ms)?;
    let mut cursor = begin_ms;

    while cursor < last_ms {
        let probe = cursor.saturating_add(PROBE_STEP_MS).min(last_ms);
        if offset_at(tz, probe)? == segment_offset {
            cursor = probe;
            continue;
        }

        // offset(lo) == segment_offset, offset(hi) != segment_offset
        let (mut lo, mut hi) = (cursor, probe);
        while hi - lo > 1 {
            let mid = lo + (hi - lo) / 2;
            if offset_at(tz, mid)? == segment_offset {
                lo = mid;
            } else {
                hi = mid;
            }
        }

        segments.push(OffsetSegment {
            start_ms: segment_start,
            end_ms: hi,
            offset_ms: segment_offset,
        });
        segment_start = hi;
        segment_offset = offset_at(tz, hi)?;
        cursor = hi;
    }

    segments.push(OffsetSegment {
        start_ms: segment_start,
        end_ms,
        offset_ms: segment_offset,
    });
    Ok(segments)
}

/// UTC offset of `tz` at the given epoch millisecond, in milliseconds.
pub(crate) fn offset_at(tz: &Tz, epoch_ms: i64) -> Result<i64> {
    let instant = DateTime::from_timestamp_millis(epoch_ms).ok_or_else(|| {
        CostError::Expansion(format!("epoch millisecond {epoch_ms} is out of range"))
    })?;
    let offset = tz.offset_from_utc_datetime(&instant.naive_utc());
    Ok(i64::from(offset.fix().local_minus_utc()) * MS_PER_SECOND)
}

// ── Tests ───────────────────────────────────────────────────────────────────
