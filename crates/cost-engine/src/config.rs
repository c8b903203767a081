//! Declarative rule definitions.
//!
//! A [`RuleDefinition`] is the serializable description of a
//! [`CostRule`] over a [`RecurringWindow`]. Definitions are plain data; call
//! [`RuleDefinition::build`] to validate one into a rule.
//!
//! ```json
//! {
//!   "window": {
//!     "span": { "hours": 9, "duration_minutes": 720 },
//!     "recurrence": { "kind": "day_of_week", "value": "Sat" },
//!     "timezone": "Europe/London"
//!   },
//!   "rate": 1.0,
//!   "rate_type": "per_hour_natural"
//! }
//! ```
//!
//! `rate_type` also accepts the integer codes of the rate table (`32` above).

use serde::{Deserialize, Serialize};

use crate::cost_rule::{CostRule, CostRuleOptions, DEFAULT_WORK_DAY_MINUTES};
use crate::error::{CostError, Result};
use crate::rate::RateType;
use crate::window::{Recurrence, RecurringWindow, TimeOfDaySpan};

/// Serializable description of a [`RecurringWindow`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowDefinition {
    pub span: TimeOfDaySpan,
    pub recurrence: Recurrence,
    /// IANA timezone name.
    pub timezone: String,
}

impl WindowDefinition {
    pub fn build(&self) -> Result<RecurringWindow> {
        RecurringWindow::new(self.span, self.recurrence.clone(), &self.timezone)
    }
}

/// A rate type given by name or by numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RateTypeRef {
    Code(i64),
    Name(RateType),
}

impl RateTypeRef {
    pub fn resolve(self) -> Result<RateType> {
        match self {
            RateTypeRef::Code(code) => RateType::from_code(code),
            RateTypeRef::Name(rate_type) => Ok(rate_type),
        }
    }
}

/// Serializable description of a [`CostRule`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub window: WindowDefinition,
    pub rate: f64,
    pub rate_type: RateTypeRef,
    #[serde(default = "default_work_day_minutes")]
    pub work_day_minutes: f64,
}

fn default_work_day_minutes() -> f64 {
    DEFAULT_WORK_DAY_MINUTES
}

impl RuleDefinition {
    /// Parse a single definition from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`CostError::Configuration`] if the JSON does not describe a rule.
    /// Values are not validated until [`RuleDefinition::build`].
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| CostError::Configuration(format!("invalid rule definition: {e}")))
    }

    /// Validate the definition into a rule.
    ///
    /// # Errors
    ///
    /// Returns whatever [`RecurringWindow::new`], [`RateType::from_code`], or
    /// [`CostRule::with_options`] rejects.
    pub fn build(&self) -> Result<CostRule<RecurringWindow>> {
        let window = self.window.build()?;
        let rate_type = self.rate_type.resolve()?;
        let options = CostRuleOptions {
            work_day_minutes: self.work_day_minutes,
        };
        CostRule::with_options(window, self.rate, rate_type, &options)
    }
}

/// Parse and build a JSON array of rule definitions, keeping their order.
///
/// # Errors
///
/// Fails on the first definition that does not parse or build; the error names
/// its position.
pub fn load_rules(json: &str) -> Result<Vec<CostRule<RecurringWindow>>> {
    let definitions: Vec<RuleDefinition> = serde_json::from_str(json)
        .map_err(|e| CostError::Configuration(format!("invalid rule definitions: {e}")))?;
    definitions
        .iter()
        .enumerate()
        .map(|(index, definition)| {
            definition
                .build()
                .map_err(|e| with_context(e, &format!("rule {index}")))
        })
        .collect()
}

/// Prefix an error's message, keeping its variant.
fn with_context(err: CostError, context: &str) -> CostError {
    let wrap = |msg: String| format!("{context}: {msg}");
    match err {
        CostError::Configuration(msg) => CostError::Configuration(wrap(msg)),
        CostError::InvalidArgument(msg) => CostError::InvalidArgument(wrap(msg)),
        CostError::InvalidTimezone(msg) => CostError::InvalidTimezone(wrap(msg)),
        CostError::InvalidDatetime(msg) => CostError::InvalidDatetime(wrap(msg)),
        CostError::InvalidDuration(msg) => CostError::InvalidDuration(wrap(msg)),
        CostError::InvalidRule(msg) => CostError::InvalidRule(wrap(msg)),
        CostError::Expansion(msg) => CostError::Expansion(wrap(msg)),
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
