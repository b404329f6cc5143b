//! Lazy occurrence generation for a single RRULE / EXRULE via the `rrule` crate.

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use rrule::{RRule, RRuleSet, RRuleSetIter, Unvalidated};

use calyx_rfc::error::RfcError;
use calyx_rfc::rfc::ical::core::{Frequency, RecurrenceRule, RuleEnd};
use calyx_rfc::rfc::ical::expand::localize_lenient;

use super::basis::{Anchor, TimeBasis};
use crate::error::{ServiceError, ServiceResult};

/// Most occurrences one pass may step over without keeping them.
pub const WALK_BUDGET: usize = 200_000;

/// Generator for the start instants of one rule, ascending.
///
/// UNTIL is applied here rather than inside `rrule`, inclusively and in the
/// master's basis, so that every caller sees the same boundary.
#[derive(Debug, Clone)]
pub struct RuleGenerator {
    rule: String,
    set: RRuleSet,
    until: Option<DateTime<Utc>>,
    count: Option<u32>,
    relocalize: Option<Tz>,
}

impl RuleGenerator {
    /// ## Summary
    /// Builds the generator anchored at the master's DTSTART.
    ///
    /// Returns `Ok(None)` when UNTIL precedes DTSTART: the rule produces nothing.
    ///
    /// ## Errors
    /// Returns `RfcError::MalformedRule` if the rule is rejected by the generator,
    /// and timezone failures from resolving UNTIL.
    pub fn build(
        rule: &RecurrenceRule,
        basis: &TimeBasis<'_>,
        anchor: Anchor,
    ) -> ServiceResult<Option<Self>> {
        let until = match &rule.end {
            RuleEnd::Until(until) => Some(basis.until_instant(until)?),
            RuleEnd::Forever | RuleEnd::Count(_) => None,
        };
        if until.is_some_and(|until| until < anchor.instant) {
            tracing::trace!(rule = %rule, "UNTIL precedes DTSTART, rule is empty");
            return Ok(None);
        }

        let mut unbounded = rule.clone();
        if until.is_some() {
            unbounded.end = RuleEnd::Forever;
        }
        let text = unbounded.to_string();

        let malformed = |reason: String| RfcError::MalformedRule {
            rule: rule.to_string(),
            reason,
        };
        let start = basis.generator_start(anchor.wall);
        let set = text
            .parse::<RRule<Unvalidated>>()
            .map_err(|err| malformed(err.to_string()))?
            .build(start.start)
            .map_err(|err| malformed(err.to_string()))?
            .limit();

        Ok(Some(Self {
            rule: rule.to_string(),
            set,
            until,
            count: match rule.end {
                RuleEnd::Count(count) => Some(count),
                RuleEnd::Forever | RuleEnd::Until(_) => None,
            },
            relocalize: start.relocalize,
        }))
    }

    /// ## Summary
    /// Builds the generator for a pass that only needs starts from `near` on.
    ///
    /// A rule without COUNT whose period is a fixed number of wall-clock
    /// seconds starts from a period boundary up to three hours before `near`,
    /// so the occurrences before it are never generated. Other rules start at
    /// DTSTART as in [`RuleGenerator::build`].
    ///
    /// ## Errors
    /// As for [`RuleGenerator::build`].
    pub fn build_near(
        rule: &RecurrenceRule,
        basis: &TimeBasis<'_>,
        anchor: Anchor,
        near: DateTime<Utc>,
    ) -> ServiceResult<Option<Self>> {
        // a DST fold can put a later instant on an earlier wall clock
        let near_wall = basis
            .wall_clock_of(near)
            .checked_sub_signed(TimeDelta::hours(3))
            .unwrap_or(NaiveDateTime::MIN);
        match realign(rule, near_wall, anchor.wall) {
            Some(wall) => {
                let moved = basis.anchor_at(wall)?;
                tracing::trace!(
                    rule = %rule,
                    from = %anchor.wall,
                    to = %moved.wall,
                    "Re-anchored rule near window"
                );
                Self::build(rule, basis, moved)
            }
            None => Self::build(rule, basis, anchor),
        }
    }

    /// Start instants in ascending order, bounded by UNTIL and COUNT only.
    pub fn iter(&self) -> Occurrences<'_> {
        Occurrences {
            generator: self,
            inner: (&self.set).into_iter(),
            produced: 0,
            done: false,
        }
    }
}

/// Last wall clock at or before `near` on the rule's period grid from `wall`.
fn realign(
    rule: &RecurrenceRule,
    near: NaiveDateTime,
    wall: NaiveDateTime,
) -> Option<NaiveDateTime> {
    if matches!(rule.end, RuleEnd::Count(_)) {
        return None;
    }
    let unit: i64 = match rule.freq {
        Frequency::Secondly => 1,
        Frequency::Minutely => 60,
        Frequency::Hourly => 3_600,
        Frequency::Daily => 86_400,
        Frequency::Weekly => 604_800,
        Frequency::Monthly | Frequency::Yearly => return None,
    };
    let step = unit.checked_mul(i64::from(rule.interval))?;
    let periods = (near - wall).num_seconds().checked_div(step)?;
    if periods <= 0 {
        return None;
    }
    wall.checked_add_signed(TimeDelta::seconds(periods.checked_mul(step)?))
}

/// Iterator over one generator's starts.
///
/// Yields an error once if `rrule` stops before the rule is exhausted, which
/// it does silently for rules it cannot advance.
pub struct Occurrences<'g> {
    generator: &'g RuleGenerator,
    inner: RRuleSetIter,
    produced: u32,
    done: bool,
}

impl Iterator for Occurrences<'_> {
    type Item = ServiceResult<DateTime<Utc>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let Some(occurrence) = self.inner.next() else {
            self.done = true;
            if self
                .generator
                .count
                .is_some_and(|count| self.produced >= count)
            {
                return None;
            }
            tracing::warn!(
                rule = %self.generator.rule,
                produced = self.produced,
                "Rule generator stopped before the rule was exhausted"
            );
            return Some(Err(RfcError::MalformedRule {
                rule: self.generator.rule.clone(),
                reason: format!(
                    "occurrence generation stopped after {} occurrences",
                    self.produced
                ),
            }
            .into()));
        };

        let occurrence = match self.generator.relocalize {
            Some(tz) => match localize_lenient(occurrence.naive_utc(), tz) {
                Ok(instant) => instant,
                Err(err) => {
                    self.done = true;
                    return Some(Err(ServiceError::timezone(tz.name(), err)));
                }
            },
            None => occurrence.with_timezone(&Utc),
        };

        if self
            .generator
            .until
            .is_some_and(|until| occurrence > until)
        {
            self.done = true;
            return None;
        }
        self.produced = self.produced.saturating_add(1);
        Some(Ok(occurrence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calyx_rfc::rfc::ical::core::EventTime;
    use calyx_rfc::rfc::ical::expand::TimeZoneResolver;

    fn value(text: &str) -> EventTime {
        text.parse().expect("valid value")
    }

    fn rule(text: &str) -> RecurrenceRule {
        text.parse().expect("valid rule")
    }

    fn starts(generator: &RuleGenerator, take: usize) -> ServiceResult<Vec<String>> {
        generator
            .iter()
            .take(take)
            .map(|occurrence| {
                occurrence.map(|instant| instant.format("%Y%m%dT%H%M%SZ").to_string())
            })
            .collect()
    }

    #[test_log::test]
    fn stalled_generator_is_an_error() {
        let resolver = TimeZoneResolver::new();
        let start = value("20240701T000000Z");
        let basis = TimeBasis::for_start(&start, Tz::UTC, &resolver).expect("basis");
        let anchor = basis.anchor(&start).expect("anchor");
        let generator = RuleGenerator::build(
            &rule("FREQ=MINUTELY;BYMONTH=6;BYHOUR=9;BYMINUTE=0;COUNT=3"),
            &basis,
            anchor,
        )
        .expect("builds")
        .expect("not empty");

        let result = starts(&generator, 10);
        assert!(matches!(
            result,
            Err(ServiceError::RfcError(RfcError::MalformedRule { .. }))
        ));
    }

    #[test_log::test]
    fn count_reached_ends_quietly() {
        let resolver = TimeZoneResolver::new();
        let start = value("20240101T090000Z");
        let basis = TimeBasis::for_start(&start, Tz::UTC, &resolver).expect("basis");
        let anchor = basis.anchor(&start).expect("anchor");
        let generator = RuleGenerator::build(&rule("FREQ=DAILY;COUNT=2"), &basis, anchor)
            .expect("builds")
            .expect("not empty");

        assert_eq!(
            starts(&generator, 10).expect("complete"),
            ["20240101T090000Z", "20240102T090000Z"]
        );
    }

    #[test_log::test]
    fn re_anchoring_keeps_the_grid() {
        let resolver = TimeZoneResolver::new();
        let start = value("20240101T000007Z");
        let basis = TimeBasis::for_start(&start, Tz::UTC, &resolver).expect("basis");
        let anchor = basis.anchor(&start).expect("anchor");
        let near = value("20240301T120000Z").naive().and_utc();

        let generator =
            RuleGenerator::build_near(&rule("FREQ=SECONDLY;INTERVAL=10"), &basis, anchor, near)
                .expect("builds")
                .expect("not empty");
        // last boundary on the 10 second grid at least three hours before `near`
        assert_eq!(
            starts(&generator, 2).expect("complete"),
            ["20240301T085957Z", "20240301T090007Z"]
        );

        // COUNT rules still start at DTSTART
        let counted =
            RuleGenerator::build_near(&rule("FREQ=SECONDLY;COUNT=5"), &basis, anchor, near)
                .expect("builds")
                .expect("not empty");
        assert_eq!(starts(&counted, 1).expect("complete"), ["20240101T000007Z"]);
    }

    #[test_log::test]
    fn gap_start_keeps_its_wall_clock() {
        let resolver = TimeZoneResolver::new();
        let start = EventTime::parse_with_tzid("20240310T023000", Some("America/New_York"))
            .expect("zoned value");
        let basis = TimeBasis::for_start(&start, Tz::UTC, &resolver).expect("basis");
        let anchor = basis.anchor(&start).expect("anchor");
        let generator = RuleGenerator::build(&rule("FREQ=DAILY;COUNT=3"), &basis, anchor)
            .expect("builds")
            .expect("not empty");

        // 02:30 does not exist on the 10th; 02:30 EDT on the following days
        assert_eq!(
            starts(&generator, 5).expect("complete"),
            ["20240310T073000Z", "20240311T063000Z", "20240312T063000Z"]
        );
    }
}
