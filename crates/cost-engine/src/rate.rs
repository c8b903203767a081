//! Rate policy table.
//!
//! A [`RateType`] names how a rate is applied to a span of usage: which
//! [`RateUnit`] the rate is quoted in, and which [`Granularity`] turns a span
//! into a number of units. The table is closed; numeric codes exist only for
//! interchange with systems that store rate types as integers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CostError, Result};
use crate::interval::{MS_PER_HOUR, MS_PER_MINUTE, MS_PER_SECOND};

/// The time unit a rate is quoted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateUnit {
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
}

impl RateUnit {
    /// Fixed length of the unit in milliseconds.
    ///
    /// `None` for [`RateUnit::Day`]: a day is either the configured work day
    /// or a real calendar day, never a constant.
    pub fn fixed_ms(self) -> Option<i64> {
        match self {
            RateUnit::Millisecond => Some(1),
            RateUnit::Second => Some(MS_PER_SECOND),
            RateUnit::Minute => Some(MS_PER_MINUTE),
            RateUnit::Hour => Some(MS_PER_HOUR),
            RateUnit::Day => None,
        }
    }
}

/// How a span is converted into a number of units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// Fractional units are charged proportionally.
    ProRata,
    /// Any fraction of a unit is charged as a whole unit.
    RoundUp,
    /// Every clock-aligned unit touched is charged once.
    Natural,
}

/// A billing policy: the pair of unit and granularity a rate applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateType {
    PerMillisecond,
    PerSecondProRata,
    PerSecondRoundUp,
    PerMinuteProRata,
    PerMinuteRoundUp,
    PerMinuteNatural,
    PerHourProRata,
    PerHourRoundUp,
    PerHourNatural,
    PerDayProRata,
    PerDayRoundUp,
    PerDayNatural,
}

impl RateType {
    pub const MIN_CODE: i64 = 0;
    pub const MAX_CODE: i64 = 42;

    pub const ALL: [RateType; 12] = [
        RateType::PerMillisecond,
        RateType::PerSecondProRata,
        RateType::PerSecondRoundUp,
        RateType::PerMinuteProRata,
        RateType::PerMinuteRoundUp,
        RateType::PerMinuteNatural,
        RateType::PerHourProRata,
        RateType::PerHourRoundUp,
        RateType::PerHourNatural,
        RateType::PerDayProRata,
        RateType::PerDayRoundUp,
        RateType::PerDayNatural,
    ];

    /// The unit and granularity of this policy.
    pub fn resolve(self) -> (RateUnit, Granularity) {
        use Granularity::*;
        use RateUnit::*;
        match self {
            RateType::PerMillisecond => (Millisecond, ProRata),
            RateType::PerSecondProRata => (Second, ProRata),
            RateType::PerSecondRoundUp => (Second, RoundUp),
            RateType::PerMinuteProRata => (Minute, ProRata),
            RateType::PerMinuteRoundUp => (Minute, RoundUp),
            RateType::PerMinuteNatural => (Minute, Natural),
            RateType::PerHourProRata => (Hour, ProRata),
            RateType::PerHourRoundUp => (Hour, RoundUp),
            RateType::PerHourNatural => (Hour, Natural),
            RateType::PerDayProRata => (Day, ProRata),
            RateType::PerDayRoundUp => (Day, RoundUp),
            RateType::PerDayNatural => (Day, Natural),
        }
    }

    pub fn unit(self) -> RateUnit {
        self.resolve().0
    }

    pub fn granularity(self) -> Granularity {
        self.resolve().1
    }

    /// Look a policy up by its unit and granularity.
    ///
    /// Milliseconds only exist pro-rata, and seconds have no natural variant.
    ///
    /// # Errors
    ///
    /// Returns [`CostError::Configuration`] for a pair the table does not define.
    pub fn new(unit: RateUnit, granularity: Granularity) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|rate_type| rate_type.resolve() == (unit, granularity))
            .ok_or_else(|| {
                CostError::Configuration(format!(
                    "no rate type for unit {unit:?} with {granularity:?} granularity"
                ))
            })
    }

    /// Decode an integer rate-type code.
    ///
    /// The tens digit selects the unit (0 ms, 1 s, 2 min, 3 h, 4 day) and the
    /// ones digit the granularity (0 pro-rata, 1 round-up, 2 natural).
    ///
    /// # Errors
    ///
    /// Returns [`CostError::Configuration`] for codes outside `0..=42` or codes
    /// inside that range which name no policy.
    ///
    /// # Examples
    ///
    /// ```
    /// use cost_engine::RateType;
    ///
    /// assert_eq!(RateType::from_code(32).unwrap(), RateType::PerHourNatural);
    /// assert!(RateType::from_code(12).is_err());
    /// ```
    pub fn from_code(code: i64) -> Result<Self> {
        if !(Self::MIN_CODE..=Self::MAX_CODE).contains(&code) {
            return Err(CostError::Configuration(format!(
                "rate type code {code} is outside {}..={}",
                Self::MIN_CODE,
                Self::MAX_CODE
            )));
        }
        Self::ALL
            .into_iter()
            .find(|rate_type| rate_type.code() == code)
            .ok_or_else(|| CostError::Configuration(format!("unrecognized rate type code {code}")))
    }

    /// The integer code of this policy.
    pub fn code(self) -> i64 {
        let (unit, granularity) = self.resolve();
        let tens = match unit {
            RateUnit::Millisecond => 0,
            RateUnit::Second => 10,
            RateUnit::Minute => 20,
            RateUnit::Hour => 30,
            RateUnit::Day => 40,
        };
        let ones = match granularity {
            Granularity::ProRata => 0,
            Granularity::RoundUp => 1,
            Granularity::Natural => 2,
        };
        tens + ones
    }
}

impl TryFrom<i64> for RateType {
    type Error = CostError;

    fn try_from(code: i64) -> Result<Self> {
        RateType::from_code(code)
    }
}

impl fmt::Display for RateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (unit, granularity) = self.resolve();
        let unit = match unit {
            RateUnit::Millisecond => "millisecond",
            RateUnit::Second => "second",
            RateUnit::Minute => "minute",
            RateUnit::Hour => "hour",
            RateUnit::Day => "day",
        };
        match (self, granularity) {
            (RateType::PerMillisecond, _) => write!(f, "per {unit}"),
            (_, Granularity::ProRata) => write!(f, "per {unit} (pro-rata)"),
            (_, Granularity::RoundUp) => write!(f, "per {unit} (rounded up)"),
            (_, Granularity::Natural) => write!(f, "per natural {unit}"),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_table() {
        let codes: Vec<i64> = RateType::ALL.iter().map(|r| r.code()).collect();
        assert_eq!(codes, vec![0, 10, 11, 20, 21, 22, 30, 31, 32, 40, 41, 42]);
    }

    #[test]
    fn test_from_code_inverts_code() {
        for rate_type in RateType::ALL {
            assert_eq!(RateType::from_code(rate_type.code()).unwrap(), rate_type);
        }
    }

    #[test]
    fn test_from_code_rejects_gaps_inside_range() {
        for code in [1, 9, 12, 23, 33, 39, 43] {
            let err = RateType::from_code(code).unwrap_err();
            assert!(matches!(err, CostError::Configuration(_)), "code {code}: {err}");
        }
    }

    #[test]
    fn test_from_code_rejects_out_of_range() {
        let err = RateType::from_code(-1).unwrap_err();
        assert!(err.to_string().contains("outside 0..=42"), "got: {err}");
        assert!(RateType::try_from(100).is_err());
    }

    #[test]
    fn test_resolve_day_natural() {
        assert_eq!(
            RateType::PerDayNatural.resolve(),
            (RateUnit::Day, Granularity::Natural)
        );
        assert_eq!(RateType::PerMillisecond.granularity(), Granularity::ProRata);
    }

    #[test]
    fn test_new_rejects_undefined_pairs() {
        assert!(RateType::new(RateUnit::Millisecond, Granularity::RoundUp).is_err());
        assert!(RateType::new(RateUnit::Second, Granularity::Natural).is_err());
        assert_eq!(
            RateType::new(RateUnit::Hour, Granularity::RoundUp).unwrap(),
            RateType::PerHourRoundUp
        );
    }

    #[test]
    fn test_fixed_ms() {
        assert_eq!(RateUnit::Minute.fixed_ms(), Some(60_000));
        assert_eq!(RateUnit::Hour.fixed_ms(), Some(3_600_000));
        assert_eq!(RateUnit::Day.fixed_ms(), None);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&RateType::PerHourNatural).unwrap();
        assert_eq!(json, "\"per_hour_natural\"");
        let parsed: RateType = serde_json::from_str("\"per_second_round_up\"").unwrap();
        assert_eq!(parsed, RateType::PerSecondRoundUp);
    }

    #[test]
    fn test_display() {
        assert_eq!(RateType::PerMillisecond.to_string(), "per millisecond");
        assert_eq!(RateType::PerHourRoundUp.to_string(), "per hour (rounded up)");
        assert_eq!(RateType::PerDayNatural.to_string(), "per natural day");
    }
}
