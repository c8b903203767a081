//! # cost-engine
//!
//! Time-based resource cost allocation.
//!
//! A [`CostRule`] pairs a recurring time window (Saturdays 09:00–21:00 in
//! `Europe/London`, say) with a rate and a rate policy. Pricing usage against
//! a rule yields the cost of the usage inside the window and the usage left
//! outside it, which can be fed into the next rule so that a list of rules
//! prices every millisecond exactly once.
//!
//! ## Modules
//!
//! - [`interval`]: Half-open usage intervals and duration components
//! - [`rate`]: The rate policy table: unit, granularity, integer codes
//! - [`natural`]: Counting clock-aligned units touched by a span, DST-aware
//! - [`window`]: Recurring windows and the partitioning trait rules depend on
//! - [`cost_rule`]: Rules, pricing, and rule ordering
//! - [`config`]: Serializable rule definitions
//! - [`error`]: Error types

pub mod config;
pub mod cost_rule;
pub mod error;
pub mod interval;
pub mod natural;
pub mod rate;
pub mod window;

pub use config::{load_rules, RateTypeRef, RuleDefinition, WindowDefinition};
pub use cost_rule::{
    price, sort_rules, AllocationResult, CostRule, CostRuleOptions, DEFAULT_WORK_DAY_MINUTES,
};
pub use error::CostError;
pub use interval::{DurationParts, UsageInterval};
pub use natural::natural_unit_count;
pub use rate::{Granularity, RateType, RateUnit};
pub use window::{Partition, Recurrence, RecurringWindow, TimeOfDaySpan, WindowPartition};
