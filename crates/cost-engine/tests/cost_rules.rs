use chrono::{DateTime, Utc, Weekday};
use cost_engine::{
    load_rules, sort_rules, CostError, CostRule, CostRuleOptions, DurationParts, RateType,
    Recurrence, RecurringWindow, TimeOfDaySpan, UsageInterval,
};

fn at(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn usage(begin: &str, minutes: i64, seconds: i64, milliseconds: i64) -> UsageInterval {
    UsageInterval::with_duration(
        at(begin),
        DurationParts {
            minutes,
            seconds,
            milliseconds,
            ..Default::default()
        },
    )
    .unwrap()
}

fn weekly(hour: u32, duration_minutes: u32, weekday: Weekday, tz: &str) -> RecurringWindow {
    RecurringWindow::new(
        TimeOfDaySpan::new(hour, 0, 0, 0, duration_minutes).unwrap(),
        Recurrence::DayOfWeek(weekday),
        tz,
    )
    .unwrap()
}

/// Saturdays 09:00–21:00 UTC.
fn saturday_rule(rate_type: RateType) -> CostRule {
    CostRule::new(weekly(9, 12 * 60, Weekday::Sat, "UTC"), 1.0, rate_type).unwrap()
}

/// The same rule with a calendar-length work day.
fn saturday_rule_24h(rate_type: RateType) -> CostRule {
    CostRule::with_options(
        weekly(9, 12 * 60, Weekday::Sat, "UTC"),
        1.0,
        rate_type,
        &CostRuleOptions {
            work_day_minutes: 1440.0,
        },
    )
    .unwrap()
}

const SATURDAY_NOON: &str = "2017-07-15T12:00:00Z";

// ── Pro-rata ────────────────────────────────────────────────────────────────

#[test]
fn test_pro_rata_milliseconds() {
    let result = saturday_rule(RateType::PerMillisecond)
        .total_cost(&[usage(SATURDAY_NOON, 60, 4, 200)])
        .unwrap();
    assert_eq!(result.cost, 3_604_200.0);
}

#[test]
fn test_pro_rata_seconds() {
    let result = saturday_rule(RateType::PerSecondProRata)
        .total_cost(&[usage(SATURDAY_NOON, 60, 33, 0)])
        .unwrap();
    assert_eq!(result.cost, 3633.0);
}

#[test]
fn test_pro_rata_minutes() {
    let result = saturday_rule(RateType::PerMinuteProRata)
        .total_cost(&[usage(SATURDAY_NOON, 60, 30, 0)])
        .unwrap();
    assert_eq!(result.cost, 60.5);
}

#[test]
fn test_pro_rata_hours() {
    let result = saturday_rule(RateType::PerHourProRata)
        .total_cost(&[usage(SATURDAY_NOON, 90, 0, 0)])
        .unwrap();
    assert_eq!(result.cost, 1.5);
}

#[test]
fn test_pro_rata_days_over_two_weeks() {
    // Friday 14th 12:00 for 16 days: three full Saturday windows of 12 hours
    let span = usage("2017-07-14T12:00:00Z", 16 * 24 * 60, 0, 0);
    let result = saturday_rule_24h(RateType::PerDayProRata)
        .total_cost(&[span])
        .unwrap();
    assert_eq!(result.cost, 1.5);
    assert_eq!(result.used_spans.len(), 3);

    // the default 8-hour work day triples the day count
    let result = saturday_rule(RateType::PerDayProRata).total_cost(&[span]).unwrap();
    assert_eq!(result.cost, 4.5);
}

// ── Natural ─────────────────────────────────────────────────────────────────

#[test]
fn test_natural_minutes() {
    let result = saturday_rule(RateType::PerMinuteNatural)
        .total_cost(&[usage(SATURDAY_NOON, 30, 20, 0)])
        .unwrap();
    assert_eq!(result.cost, 31.0);
}

#[test]
fn test_natural_hours_over_two_spans() {
    let rule = saturday_rule(RateType::PerHourNatural);
    let first = usage("2017-07-15T10:00:00Z", 45, 0, 0);
    assert_eq!(rule.total_cost(&[first]).unwrap().cost, 1.0);

    // 12:01:02.300 – 13:11:02.300 touches two more clock-hours
    let second = usage("2017-07-15T12:01:02.300Z", 70, 0, 0);
    assert_eq!(rule.total_cost(&[first, second]).unwrap().cost, 3.0);
}

#[test]
fn test_natural_day_single_day() {
    let result = saturday_rule(RateType::PerDayNatural)
        .total_cost(&[usage(SATURDAY_NOON, 30, 0, 0)])
        .unwrap();
    assert_eq!(result.cost, 1.0);
}

#[test]
fn test_natural_day_only_charges_inside_window() {
    // 24 hours from Saturday noon reaches into Sunday, which the rule does not cover
    let result = saturday_rule(RateType::PerDayNatural)
        .total_cost(&[usage(SATURDAY_NOON, 24 * 60, 0, 0)])
        .unwrap();
    assert_eq!(result.cost, 1.0);
    assert_eq!(
        result.remainder_spans,
        vec![UsageInterval::new(at("2017-07-15T21:00:00Z"), at("2017-07-16T12:00:00Z")).unwrap()]
    );
}

// ── Round-up ────────────────────────────────────────────────────────────────

#[test]
fn test_round_up_seconds() {
    let result = saturday_rule(RateType::PerSecondRoundUp)
        .total_cost(&[usage(SATURDAY_NOON, 60, 20, 200)])
        .unwrap();
    assert_eq!(result.cost, 3621.0);
}

#[test]
fn test_round_up_minutes() {
    let result = saturday_rule(RateType::PerMinuteRoundUp)
        .total_cost(&[usage(SATURDAY_NOON, 60, 20, 200)])
        .unwrap();
    assert_eq!(result.cost, 61.0);
}

#[test]
fn test_round_up_hours() {
    let result = saturday_rule(RateType::PerHourRoundUp)
        .total_cost(&[usage(SATURDAY_NOON, 120, 20, 0)])
        .unwrap();
    assert_eq!(result.cost, 3.0);
}

#[test]
fn test_round_up_days_rounds_each_span() {
    // Saturday 15th 12:00 for 16 days: windows of 9h, 12h and 12h,
    // each rounded up to a whole day on its own
    let result = saturday_rule_24h(RateType::PerDayRoundUp)
        .total_cost(&[usage(SATURDAY_NOON, 16 * 24 * 60, 0, 0)])
        .unwrap();
    assert_eq!(result.cost, 3.0);
    let hours: Vec<i64> = result
        .used_spans
        .iter()
        .map(|span| span.duration_ms() / 3_600_000)
        .collect();
    assert_eq!(hours, vec![9, 12, 12]);
}

// ── Overlaps and remainders ─────────────────────────────────────────────────

#[test]
fn test_no_overlap_single_remainder() {
    let rule = CostRule::new(
        weekly(13, 60, Weekday::Sat, "UTC"),
        1.0,
        RateType::PerHourProRata,
    )
    .unwrap();
    let span = usage("2017-07-15T22:00:00Z", 60, 0, 0);
    let result = rule.total_cost(&[span]).unwrap();
    assert_eq!(result.cost, 0.0);
    assert!(result.used_spans.is_empty());
    assert_eq!(result.remainder_spans, vec![span]);
}

#[test]
fn test_single_overlap_single_remainder() {
    let rule = CostRule::new(
        weekly(13, 60, Weekday::Sat, "UTC"),
        1.0,
        RateType::PerHourProRata,
    )
    .unwrap();
    let result = rule
        .total_cost(&[usage("2017-07-15T13:00:00Z", 120, 0, 0)])
        .unwrap();
    assert_eq!(result.cost, 1.0);
    assert_eq!(result.used_spans, vec![usage("2017-07-15T13:00:00Z", 60, 0, 0)]);
    assert_eq!(result.remainder_spans, vec![usage("2017-07-15T14:00:00Z", 60, 0, 0)]);
}

#[test]
fn test_single_overlap_double_remainder() {
    let rule = CostRule::new(
        weekly(14, 2 * 60, Weekday::Sat, "UTC"),
        1.0,
        RateType::PerHourProRata,
    )
    .unwrap();
    let result = rule
        .total_cost(&[usage("2017-07-15T13:00:00Z", 4 * 60, 0, 0)])
        .unwrap();
    assert_eq!(result.cost, 2.0);
    assert_eq!(result.used_spans, vec![usage("2017-07-15T14:00:00Z", 120, 0, 0)]);
    assert_eq!(
        result.remainder_spans,
        vec![
            usage("2017-07-15T13:00:00Z", 60, 0, 0),
            usage("2017-07-15T16:00:00Z", 60, 0, 0),
        ]
    );
}

// ── Chaining ────────────────────────────────────────────────────────────────

#[test]
fn test_chained_rules_price_a_week() {
    let peak = |weekday, rate| {
        CostRule::new(weekly(9, 9 * 60, weekday, "UTC"), rate, RateType::PerHourProRata).unwrap()
    };
    let off_peak = |weekday| {
        CostRule::new(weekly(0, 24 * 60, weekday, "UTC"), 1.0, RateType::PerHourProRata).unwrap()
    };
    let rules = [
        (peak(Weekday::Tue, 3.0), 0.0),
        (peak(Weekday::Wed, 4.0), 4.0),
        (peak(Weekday::Fri, 6.0), 30.0),
        (off_peak(Weekday::Fri), 4.0),
        (off_peak(Weekday::Sat), 12.0),
        (off_peak(Weekday::Sun), 4.0),
    ];

    let mut remaining = vec![
        usage("2017-07-05T16:00:00Z", 60, 0, 0),      // Wednesday, peak
        usage("2017-07-14T12:00:00Z", 5 * 60, 0, 0),  // Friday, peak
        usage("2017-07-14T19:00:00Z", 4 * 60, 0, 0),  // Friday, off-peak
        usage("2017-07-15T10:00:00Z", 12 * 60, 0, 0), // Saturday
        usage("2017-07-16T13:00:00Z", 4 * 60, 0, 0),  // Sunday
    ];
    let mut total = 0.0;
    for (rule, expected) in &rules {
        let result = rule.total_cost_in(&remaining, Some("UTC")).unwrap();
        assert_eq!(result.cost, *expected);
        total += result.cost;
        remaining = result.remainder_spans;
    }
    assert_eq!(total, 54.0);
    assert!(remaining.is_empty());
}

#[test]
fn test_split_window_chain_matches_combined_rule() {
    let rule = |hour: u32, hours: u32| {
        CostRule::new(weekly(hour, hours * 60, Weekday::Sat, "UTC"), 2.0, RateType::PerHourProRata)
            .unwrap()
    };
    let morning = rule(9, 3);
    let midday = rule(12, 3);
    let combined = rule(9, 6);
    let input = [
        usage("2017-07-15T08:00:00Z", 8 * 60 + 30, 0, 0),
        usage("2017-07-22T11:15:00Z", 90, 0, 0),
    ];

    let first = morning.total_cost(&input).unwrap();
    let second = midday.total_cost(&first.remainder_spans).unwrap();
    let whole = combined.total_cost(&input).unwrap();

    assert_eq!(first.cost, 6.0 + 1.5);
    assert_eq!(second.cost, 6.0 + 1.5);
    assert_eq!(first.cost + second.cost, whole.cost);
    assert_eq!(second.remainder_spans, whole.remainder_spans);
}

#[test]
fn test_interval_at_earliest_instant_is_an_error() {
    let earliest = UsageInterval::from_millis(DateTime::<Utc>::MIN_UTC, 3_600_000).unwrap();
    let err = saturday_rule(RateType::PerHourNatural)
        .total_cost(&[earliest])
        .unwrap_err();
    assert!(matches!(err, CostError::Expansion(_)), "got: {err}");
}

#[test]
fn test_sorted_rules_from_definitions() {
    let json = r#"[
        {
            "window": {
                "span": { "duration_minutes": 1440 },
                "recurrence": { "kind": "daily" },
                "timezone": "UTC"
            },
            "rate": 1.0,
            "rate_type": 30
        },
        {
            "window": {
                "span": { "hours": 9, "duration_minutes": 540 },
                "recurrence": { "kind": "day_of_week", "value": "Fri" },
                "timezone": "UTC"
            },
            "rate": 6.0,
            "rate_type": "per_hour_pro_rata"
        }
    ]"#;
    let mut rules = load_rules(json).unwrap();
    sort_rules(&mut rules);
    assert_eq!(rules[0].rate(), 6.0);

    let mut remaining = vec![usage("2017-07-14T12:00:00Z", 11 * 60, 0, 0)];
    let mut total = 0.0;
    for rule in &rules {
        let result = rule.total_cost(&remaining).unwrap();
        total += result.cost;
        remaining = result.remainder_spans;
    }
    // six peak hours at 6, five off-peak at 1
    assert_eq!(total, 41.0);
    assert!(remaining.is_empty());
}

// ── Timezones ───────────────────────────────────────────────────────────────

#[test]
fn test_timezone_override_moves_window() {
    // Saturdays 09:00–21:00 evaluated in Dubai (UTC+4) is 05:00–17:00 UTC
    let rule = saturday_rule(RateType::PerHourProRata);
    let day = usage("2017-07-15T00:00:00Z", 24 * 60, 0, 0);
    let result = rule.total_cost_in(&[day], Some("Asia/Dubai")).unwrap();
    assert_eq!(result.cost, 12.0);
    assert_eq!(result.used_spans[0].begin(), at("2017-07-15T05:00:00Z"));

    // and in Antigua (UTC-4) it is 13:00–01:00 UTC
    let result = rule.total_cost_in(&[day], Some("America/Antigua")).unwrap();
    assert_eq!(result.used_spans, vec![usage("2017-07-15T13:00:00Z", 11 * 60, 0, 0)]);
}

#[test]
fn test_natural_hours_across_spring_forward() {
    // Sunday 26 March 2017 in London loses 01:00–02:00 local
    let rule = CostRule::new(
        RecurringWindow::new(
            TimeOfDaySpan::new(0, 0, 0, 0, 24 * 60).unwrap(),
            Recurrence::Daily,
            "Europe/London",
        )
        .unwrap(),
        1.0,
        RateType::PerHourNatural,
    )
    .unwrap();
    // 00:30Z–01:30Z is local 00:30 GMT – 02:30 BST
    let span = UsageInterval::new(at("2017-03-26T00:30:00Z"), at("2017-03-26T01:30:00Z")).unwrap();
    assert_eq!(rule.total_cost(&[span]).unwrap().cost, 2.0);
}

#[test]
fn test_natural_day_on_short_dst_day() {
    let rule = CostRule::new(
        RecurringWindow::new(
            TimeOfDaySpan::new(0, 0, 0, 0, 24 * 60).unwrap(),
            Recurrence::Date(chrono::NaiveDate::from_ymd_opt(2017, 3, 26).unwrap()),
            "Europe/London",
        )
        .unwrap(),
        5.0,
        RateType::PerDayNatural,
    )
    .unwrap();
    // local midnight to midnight is 23 hours of UTC
    let day = UsageInterval::new(at("2017-03-25T12:00:00Z"), at("2017-03-27T12:00:00Z")).unwrap();
    let result = rule.total_cost(&[day]).unwrap();
    assert_eq!(
        result.used_spans,
        vec![UsageInterval::new(at("2017-03-26T00:00:00Z"), at("2017-03-26T23:00:00Z")).unwrap()]
    );
    assert_eq!(result.cost, 5.0);
}

// ── Errors ──────────────────────────────────────────────────────────────────

#[test]
fn test_invalid_override_is_reported() {
    let err = saturday_rule(RateType::PerHourNatural)
        .total_cost_in(&[usage(SATURDAY_NOON, 30, 0, 0)], Some("Not/AZone"))
        .unwrap_err();
    assert!(matches!(err, CostError::InvalidTimezone(_)), "got: {err}");
}

#[test]
fn test_usage_from_json_is_validated() {
    let parsed: Vec<UsageInterval> = serde_json::from_str(
        r#"[{"begin": "2017-07-15T12:00:00Z", "duration_ms": 5400000}]"#,
    )
    .unwrap();
    let result = saturday_rule(RateType::PerHourProRata).total_cost(&parsed).unwrap();
    assert_eq!(result.cost, 1.5);

    let negative = serde_json::from_str::<UsageInterval>(
        r#"{"begin": "2017-07-15T12:00:00Z", "duration_ms": -1}"#,
    );
    assert!(negative.is_err());
}
