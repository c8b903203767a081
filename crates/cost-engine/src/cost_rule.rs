//! Cost rules: a recurring window, a rate, and a rate policy.
//!
//! [`CostRule::total_cost`] splits usage against the rule's window, prices the
//! portions inside it, and hands back the portions outside it so the caller can
//! run them through the next rule:
//!
//! ```
//! use chrono::Weekday;
//! use cost_engine::{CostRule, RateType, Recurrence, RecurringWindow, TimeOfDaySpan, UsageInterval};
//!
//! let peak = TimeOfDaySpan::new(9, 0, 0, 0, 9 * 60).unwrap();
//! let friday_peak = CostRule::new(
//!     RecurringWindow::new(peak, Recurrence::DayOfWeek(Weekday::Fri), "UTC").unwrap(),
//!     6.0,
//!     RateType::PerHourProRata,
//! )
//! .unwrap();
//! let friday_off_peak = CostRule::new(
//!     RecurringWindow::new(
//!         TimeOfDaySpan::new(0, 0, 0, 0, 24 * 60).unwrap(),
//!         Recurrence::DayOfWeek(Weekday::Fri),
//!         "UTC",
//!     )
//!     .unwrap(),
//!     1.0,
//!     RateType::PerHourProRata,
//! )
//! .unwrap();
//!
//! // Friday 12:00–23:00: six peak hours, five off-peak
//! let usage = [UsageInterval::parse("2017-07-14T12:00:00Z", "2017-07-14T23:00:00Z").unwrap()];
//! let first = friday_peak.total_cost(&usage).unwrap();
//! let second = friday_off_peak.total_cost(&first.remainder_spans).unwrap();
//! assert_eq!(first.cost, 36.0);
//! assert_eq!(second.cost, 5.0);
//! ```

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{CostError, Result};
use crate::interval::{UsageInterval, MS_PER_MINUTE};
use crate::natural::natural_unit_count;
use crate::rate::{Granularity, RateType};
use crate::window::{parse_timezone, Partition, RecurringWindow, WindowPartition};

/// Length of the work day used by day pro-rata and round-up policies: 8 hours.
pub const DEFAULT_WORK_DAY_MINUTES: f64 = 480.0;

/// Options for [`CostRule::with_options`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostRuleOptions {
    /// Minutes in one billable day for [`RateType::PerDayProRata`] and
    /// [`RateType::PerDayRoundUp`]. Natural days ignore it.
    pub work_day_minutes: f64,
}

impl Default for CostRuleOptions {
    fn default() -> Self {
        CostRuleOptions {
            work_day_minutes: DEFAULT_WORK_DAY_MINUTES,
        }
    }
}

/// The outcome of pricing usage against one rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AllocationResult {
    /// Sum of the cost of every used span.
    pub cost: f64,
    /// Usage inside the rule's window, ordered by begin.
    pub used_spans: Vec<UsageInterval>,
    /// Usage outside the rule's window, ordered by begin.
    pub remainder_spans: Vec<UsageInterval>,
}

/// An immutable billing rule.
#[derive(Debug, Clone, PartialEq)]
pub struct CostRule<W = RecurringWindow> {
    window: W,
    rate: f64,
    rate_type: RateType,
    work_day_minutes: f64,
}

impl<W: WindowPartition> CostRule<W> {
    /// Build a rule with the default 8-hour work day.
    ///
    /// # Errors
    ///
    /// Returns [`CostError::Configuration`] if `rate` is negative or not finite.
    pub fn new(window: W, rate: f64, rate_type: RateType) -> Result<Self> {
        Self::with_options(window, rate, rate_type, &CostRuleOptions::default())
    }

    /// Build a rule with explicit options.
    ///
    /// # Errors
    ///
    /// Returns [`CostError::Configuration`] if `rate` is negative or not finite,
    /// or if the work day is not a finite positive number of minutes.
    pub fn with_options(
        window: W,
        rate: f64,
        rate_type: RateType,
        options: &CostRuleOptions,
    ) -> Result<Self> {
        if !rate.is_finite() || rate < 0.0 {
            return Err(CostError::Configuration(format!(
                "rate must be a finite, non-negative number, got {rate}"
            )));
        }
        let work_day_minutes = options.work_day_minutes;
        if !work_day_minutes.is_finite() || work_day_minutes <= 0.0 {
            return Err(CostError::Configuration(format!(
                "work day must be a finite, positive number of minutes, got {work_day_minutes}"
            )));
        }
        Ok(CostRule {
            window,
            rate,
            rate_type,
            work_day_minutes,
        })
    }

    pub fn window(&self) -> &W {
        &self.window
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn rate_type(&self) -> RateType {
        self.rate_type
    }

    pub fn work_day_minutes(&self) -> f64 {
        self.work_day_minutes
    }

    /// Price `intervals` against this rule in the window's own timezone.
    ///
    /// See [`CostRule::total_cost_in`].
    pub fn total_cost(&self, intervals: &[UsageInterval]) -> Result<AllocationResult> {
        self.total_cost_in(intervals, None)
    }

    /// Price `intervals` against this rule.
    ///
    /// The window splits the intervals into used and remainder spans; each used
    /// span is priced under the rule's rate type and the prices are summed.
    /// Zero-duration intervals, given or produced by the window, are dropped.
    /// `timezone_override` is handed to the window unchanged and, when present,
    /// also defines the natural buckets.
    ///
    /// # Errors
    ///
    /// Returns [`CostError::InvalidArgument`] for a malformed interval, before
    /// any work is done; window errors are returned as the window reports them.
    pub fn total_cost_in(
        &self,
        intervals: &[UsageInterval],
        timezone_override: Option<&str>,
    ) -> Result<AllocationResult> {
        // Constructors already enforce this; kept as a backstop that names the index.
        for (index, interval) in intervals.iter().enumerate() {
            interval.validate().map_err(|e| match e {
                CostError::InvalidArgument(msg) => {
                    CostError::InvalidArgument(format!("usage interval {index}: {msg}"))
                }
                other => other,
            })?;
        }
        let tz = match timezone_override {
            Some(name) => parse_timezone(name)?,
            None => self.window.timezone(),
        };
        let inputs: Vec<UsageInterval> = intervals
            .iter()
            .copied()
            .filter(|interval| !interval.is_empty())
            .collect();

        tracing::debug!(
            intervals = inputs.len(),
            rate = self.rate,
            rate_type = %self.rate_type,
            timezone = tz.name(),
            "allocating cost"
        );

        let Partition {
            mut matched,
            mut unmatched,
        } = self.window.partition(&inputs, timezone_override)?;
        matched.retain(|span| !span.is_empty());
        unmatched.retain(|span| !span.is_empty());

        let work_day_ms = self.work_day_minutes * MS_PER_MINUTE as f64;
        let mut cost = 0.0;
        for span in &matched {
            let span_cost = price(span, self.rate_type, self.rate, work_day_ms, &tz)?;
            tracing::trace!(
                begin = %span.begin().to_rfc3339(),
                duration_ms = span.duration_ms(),
                cost = span_cost,
                "priced span"
            );
            cost += span_cost;
        }

        tracing::debug!(
            cost,
            used = matched.len(),
            remainder = unmatched.len(),
            "cost allocated"
        );

        Ok(AllocationResult {
            cost,
            used_spans: matched,
            remainder_spans: unmatched,
        })
    }
}

/// Price one span under a rate policy.
///
/// `work_day_ms` is the length of a billable day for day pro-rata and round-up;
/// `tz` defines the clock-aligned buckets of natural policies.
///
/// # Errors
///
/// Returns [`CostError::Expansion`] if a natural count cannot map the span into `tz`.
pub fn price(
    interval: &UsageInterval,
    rate_type: RateType,
    rate: f64,
    work_day_ms: f64,
    tz: &Tz,
) -> Result<f64> {
    let duration_ms = interval.duration_ms();
    if duration_ms <= 0 {
        return Ok(0.0);
    }
    let (unit, granularity) = rate_type.resolve();
    let units = match (granularity, unit.fixed_ms()) {
        (Granularity::ProRata, Some(unit_ms)) => duration_ms as f64 / unit_ms as f64,
        (Granularity::ProRata, None) => duration_ms as f64 / work_day_ms,
        (Granularity::RoundUp, Some(unit_ms)) => ((duration_ms + unit_ms - 1) / unit_ms) as f64,
        (Granularity::RoundUp, None) => (duration_ms as f64 / work_day_ms).ceil(),
        (Granularity::Natural, _) => natural_unit_count(interval, unit, tz)? as f64,
    };
    Ok(rate * units)
}

/// Order rules for chained evaluation: highest rate first, then by rate-type code.
///
/// The sort is stable, so rules that tie keep their relative order.
pub fn sort_rules<W>(rules: &mut [CostRule<W>]) {
    rules.sort_by(|a, b| {
        b.rate
            .total_cmp(&a.rate)
            .then_with(|| a.rate_type.code().cmp(&b.rate_type.code()))
    });
}

// ── Tests ───────────────────────────────────────────────────────────────────
