//! Outer bound of a master's occurrences without full expansion.

use chrono::{DateTime, Months, TimeDelta, Utc};

use calyx_rfc::rfc::ical::core::{PeriodEnd, RecurrenceRule, RuleEnd};

use super::basis::{Anchor, TimeBasis};
use super::generator::{RuleGenerator, WALK_BUDGET};
use crate::caldav::model::{EventEnd, MasterEvent, RecurrenceRange};
use crate::error::ServiceResult;

/// Width of one step of the COUNT resolution loop.
pub const COUNT_WINDOW_DAYS: i64 = 100;

/// `start` plus `years`, saturating at the end of representable time.
#[must_use]
pub fn horizon(start: DateTime<Utc>, years: u32) -> DateTime<Utc> {
    start
        .checked_add_months(Months::new(years.saturating_mul(12)))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// ## Summary
/// Computes the range covering every occurrence of `master`.
///
/// - start: DTSTART, lowered by any earlier RDATE
/// - end: the latest UNTIL, COUNT-th occurrence or RDATE end, plus the event
///   duration and one day of slack (one week for week-granular durations)
/// - unbounded rules make the range infinite
///
/// The end never exceeds DTSTART + `max_years`, nor `parent_end` when given.
///
/// Returns `Ok(None)` for a master with no RRULE and no RDATE.
///
/// ## Errors
/// Fails on unresolvable timezones and on rules the generator rejects.
#[tracing::instrument(skip(master, basis), fields(uid = %master.uid))]
pub fn compute_range(
    master: &MasterEvent,
    basis: &TimeBasis<'_>,
    max_years: u32,
    parent_end: Option<DateTime<Utc>>,
) -> ServiceResult<Option<RecurrenceRange>> {
    if !master.is_recurring() {
        return Ok(None);
    }

    let origin = basis.anchor(&master.start)?;
    let start = origin.instant;
    let duration = basis.duration(master, start)?;
    let cap = horizon(start, max_years);

    let mut range_start = start;
    let mut latest = start;
    let mut infinite = false;

    for rule in &master.rrules {
        let last = match &rule.end {
            RuleEnd::Forever => {
                infinite = true;
                None
            }
            RuleEnd::Until(until) => Some(basis.until_instant(until)?),
            RuleEnd::Count(count) => last_counted(rule, basis, origin, *count, cap)?,
        };
        tracing::trace!(rule = %rule, last = ?last, "Resolved rule bound");
        if let Some(last) = last {
            latest = latest.max(last);
        }
    }

    for rdate in &master.rdates {
        let rdate_start = basis.instant(rdate.start())?;
        let rdate_end = match rdate.period_end() {
            Some(PeriodEnd::Explicit(end)) => basis.instant(end)?,
            Some(PeriodEnd::Duration(duration)) => rdate_start + duration.to_time_delta(),
            None => rdate_start,
        };
        range_start = range_start.min(rdate_start);
        latest = latest.max(rdate_end);
    }

    let slack = match &master.end {
        Some(EventEnd::Duration(duration)) if duration.is_week_granular() => TimeDelta::weeks(1),
        _ => TimeDelta::days(1),
    };

    let mut end = if infinite {
        cap
    } else {
        latest
            .checked_add_signed(duration + slack)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
            .min(cap)
    };
    if let Some(parent_end) = parent_end {
        end = end.min(parent_end);
    }

    Ok(Some(RecurrenceRange {
        start: range_start,
        end: end.max(range_start),
        infinite,
    }))
}

/// ## Summary
/// Finds the start of the COUNT-th occurrence by walking fixed windows.
///
/// Only a running count and the last start are kept. The walk stops at `cap`,
/// so a COUNT the rule cannot reach within the horizon ends there. A walk
/// longer than [`WALK_BUDGET`] also ends at `cap`.
fn last_counted(
    rule: &RecurrenceRule,
    basis: &TimeBasis<'_>,
    origin: Anchor,
    count: u32,
    cap: DateTime<Utc>,
) -> ServiceResult<Option<DateTime<Utc>>> {
    let Some(generator) = RuleGenerator::build(rule, basis, origin)? else {
        return Ok(None);
    };

    let budget = u32::try_from(WALK_BUDGET).unwrap_or(u32::MAX);
    let mut occurrences = generator.iter();
    let mut pending = None;
    let mut produced: u32 = 0;
    let mut last = None;
    let mut window_start = origin.instant;

    'walk: while produced < count && window_start < cap {
        let window_end = window_start
            .checked_add_signed(TimeDelta::days(COUNT_WINDOW_DAYS))
            .unwrap_or(cap)
            .min(cap);

        while produced < count {
            let occurrence = match pending.take() {
                Some(occurrence) => occurrence,
                None => match occurrences.next().transpose()? {
                    Some(occurrence) => occurrence,
                    None => break 'walk,
                },
            };
            if occurrence >= window_end {
                pending = Some(occurrence);
                break;
            }
            produced += 1;
            last = Some(occurrence);
            if produced >= budget {
                tracing::debug!(
                    rule = %rule,
                    produced,
                    count,
                    "COUNT walk over budget, bounded by horizon"
                );
                return Ok(Some(cap));
            }
        }

        tracing::trace!(%window_start, %window_end, produced, "Counted window");
        window_start = window_end;
    }

    if produced < count {
        tracing::debug!(rule = %rule, produced, count, "COUNT not reached within horizon");
    }
    Ok(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use calyx_rfc::rfc::ical::core::{EventDuration, EventTime, RDate};
    use calyx_rfc::rfc::ical::expand::TimeZoneResolver;
    use chrono_tz::Tz;

    fn value(text: &str) -> EventTime {
        text.parse().expect("valid value")
    }

    fn instant(text: &str) -> DateTime<Utc> {
        value(text).naive().and_utc()
    }

    fn range_of(master: &MasterEvent, max_years: u32) -> Option<RecurrenceRange> {
        let resolver = TimeZoneResolver::new();
        let basis = TimeBasis::for_start(&master.start, Tz::UTC, &resolver).expect("basis");
        compute_range(master, &basis, max_years, None).expect("range")
    }

    #[test_log::test]
    fn non_recurring_has_no_range() {
        let master = MasterEvent::new("single", value("20240101T090000Z"));
        assert_eq!(range_of(&master, 10), None);
    }

    #[test_log::test]
    fn count_rule_ends_after_last_occurrence_plus_slack() {
        let master = MasterEvent::new("count", value("20240101T090000Z"))
            .with_duration(EventDuration::hours(1))
            .with_rrule("FREQ=WEEKLY;COUNT=5".parse().expect("valid rule"));

        let range = range_of(&master, 10).expect("recurring");
        assert_eq!(range.start, instant("20240101T090000Z"));
        // last occurrence 2024-01-29 09:00 + 1h + 1 day
        assert_eq!(range.end, instant("20240130T100000Z"));
        assert!(!range.infinite);
    }

    #[test_log::test]
    fn count_spanning_many_windows() {
        let master = MasterEvent::new("long", value("20240101T090000Z"))
            .with_rrule("FREQ=DAILY;COUNT=365".parse().expect("valid rule"));

        let range = range_of(&master, 10).expect("recurring");
        // 2024 is a leap year: occurrence 365 is 2024-12-30
        assert_eq!(range.end, instant("20241231T090000Z"));
    }

    #[test_log::test]
    fn until_is_used_directly() {
        let master = MasterEvent::new("until", value("20240101T090000Z"))
            .with_rrule("FREQ=DAILY;UNTIL=20240105T000000Z".parse().expect("valid rule"));
        let range = range_of(&master, 10).expect("recurring");
        assert_eq!(range.end, instant("20240106T000000Z"));
    }

    #[test_log::test]
    fn long_count_walk_is_bounded_by_the_horizon() {
        let master = MasterEvent::new("dense", value("20240101T000000Z"))
            .with_rrule("FREQ=SECONDLY;COUNT=4000000".parse().expect("valid rule"));
        let range = range_of(&master, 2).expect("recurring");
        assert_eq!(range.end, instant("20260101T000000Z"));
        assert!(!range.infinite);
    }

    #[test_log::test]
    fn week_granular_duration_adds_a_week() {
        let master = MasterEvent::new("weeks", value("20240101"))
            .with_duration(EventDuration::weeks(1))
            .with_rrule("FREQ=MONTHLY;COUNT=2".parse().expect("valid rule"));
        let range = range_of(&master, 10).expect("recurring");
        // last start 2024-02-01 + 1 week + 1 week slack
        assert_eq!(range.end, instant("20240215T000000Z"));
    }

    #[test_log::test]
    fn infinite_rule_is_capped_by_max_years() {
        let master = MasterEvent::new("forever", value("20240101T090000Z"))
            .with_rrule("FREQ=SECONDLY".parse().expect("valid rule"));
        let range = range_of(&master, 5).expect("recurring");
        assert!(range.infinite);
        assert_eq!(range.end, instant("20290101T090000Z"));
    }

    #[test_log::test]
    fn rdates_extend_both_ends_and_parent_caps() {
        let master = MasterEvent::new("rdates", value("20240110T090000Z"))
            .with_rdate(value("20240105T090000Z"))
            .with_rdate(
                RDate::parse_with_tzid("20240301T090000Z/20240302T090000Z", None)
                    .expect("valid period"),
            );

        let range = range_of(&master, 10).expect("recurring");
        assert_eq!(range.start, instant("20240105T090000Z"));
        assert_eq!(range.end, instant("20240303T090000Z"));

        let resolver = TimeZoneResolver::new();
        let basis = TimeBasis::for_start(&master.start, Tz::UTC, &resolver).expect("basis");
        let capped = compute_range(&master, &basis, 10, Some(instant("20240201T000000Z")))
            .expect("range")
            .expect("recurring");
        assert_eq!(capped.end, instant("20240201T000000Z"));
    }
}
